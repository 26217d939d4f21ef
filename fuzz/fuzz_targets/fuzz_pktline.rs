//! Fuzz target for pkt-line framing.
//!
//! Every payload either frames to a 4 hex digit length header followed by the
//! payload itself, or is rejected as too large.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sourcepods_git::{frame, MAX_PKT_LEN};

fuzz_target!(|data: &[u8]| {
    match frame(data) {
        Ok(framed) => {
            assert!(data.len() + 4 <= MAX_PKT_LEN);
            assert_eq!(&framed[4..], data);

            let header = std::str::from_utf8(&framed[..4]).unwrap();
            assert!(header.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
            assert_eq!(usize::from_str_radix(header, 16).unwrap(), framed.len());
        }
        Err(_) => assert!(data.len() + 4 > MAX_PKT_LEN),
    }
});
