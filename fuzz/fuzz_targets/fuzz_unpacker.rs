#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The unpacker consumes untrusted byte buffers; it must never panic, only
    // return a typed error for malformed input.
    let _ = gait_core::unpacker::unpack(data);
});
