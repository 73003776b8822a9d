//! Tests for `AllocatedFrames`, mainly the `split` method's edge cases at
//! the beginning, middle, and end of a range.

extern crate std;

use self::std::dbg;

use super::*;

fn from_addrs(start_addr: usize, end_addr: usize) -> AllocatedFrames {
    AllocatedFrames {
        frames: FrameRange::new(
            Frame::containing_address(PhysicalAddress::new_canonical(start_addr)),
            Frame::containing_address(PhysicalAddress::new_canonical(end_addr)),
        ),
    }
}

fn frame_addr(addr: usize) -> Frame {
    Frame::containing_address(PhysicalAddress::new_canonical(addr))
}

#[test]
fn split_before_beginning_fails() {
    let original = from_addrs(0x4275000, 0x4285000);
    let split_at = frame_addr(0x4274000);
    let result = original.split(split_at);
    dbg!(result.is_err());
    assert!(result.is_err());
}

#[test]
fn split_at_beginning_fails() {
    // A split point equal to the start leaves an empty first half, which
    // `split` rejects rather than returning a degenerate range.
    let original = from_addrs(0x4275000, 0x4285000);
    let split_at = frame_addr(0x4275000);
    let result = original.split(split_at);
    assert!(result.is_err());
}

#[test]
fn split_in_the_middle() {
    let original = from_addrs(0x4275000, 0x4285000);
    let split_at = frame_addr(0x427a000);
    let (first, second) = original.split(split_at).unwrap();
    assert_eq!(*first.start(), frame_addr(0x4275000));
    assert_eq!(*first.end(), frame_addr(0x4279000));
    assert_eq!(*second.start(), frame_addr(0x427a000));
    assert_eq!(*second.end(), frame_addr(0x4285000));
}

#[test]
fn split_one_past_the_end_keeps_everything_in_the_first_half() {
    let original = from_addrs(0x4275000, 0x4285000);
    let split_at = frame_addr(0x4286000);
    let (first, second) = original.split(split_at).unwrap();
    assert_eq!(*first.start(), frame_addr(0x4275000));
    assert_eq!(*first.end(), frame_addr(0x4285000));
    assert!(second.is_empty());
}

#[test]
fn split_past_the_end_fails() {
    let original = from_addrs(0x4275000, 0x4285000);
    let split_at = frame_addr(0x4287000);
    let result = original.split(split_at);
    assert!(result.is_err());
}

#[test]
fn split_single_frame_always_fails() {
    let original = from_addrs(0x4275000, 0x4275000);
    let split_at = frame_addr(0x4275000);
    assert!(original.split(split_at).is_err());
}

#[test]
fn merge_contiguous_ranges_succeeds() {
    let mut first = from_addrs(0x4275000, 0x4279000);
    let second = from_addrs(0x427a000, 0x4285000);
    assert!(first.merge(second).is_ok());
    assert_eq!(*first.start(), frame_addr(0x4275000));
    assert_eq!(*first.end(), frame_addr(0x4285000));
}

#[test]
fn merge_non_contiguous_ranges_fails() {
    let mut first = from_addrs(0x4275000, 0x4279000);
    let second = from_addrs(0x427b000, 0x4285000);
    assert!(first.merge(second).is_err());
}
