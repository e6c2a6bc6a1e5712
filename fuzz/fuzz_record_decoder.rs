//! Fuzz target for the accessory record decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_record_decoder
//!
//! Exercises `decode_record` and the simple-result/notification parsers
//! with arbitrary byte sequences to find panics. Every input must either
//! decode cleanly or fail with a typed error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use usbgate_core::ipc::wire;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = wire::decode_record(s);
        let _ = wire::SimpleResult::from_wire(s);
        let _ = wire::Notification::from_wire(s);
    }
});
