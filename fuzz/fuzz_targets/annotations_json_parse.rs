//! Fuzz target for canonical annotation JSON parsing.
//!
//! Feeds arbitrary bytes to the interchange reader and checks that the
//! in-frame filter never panics on whatever deserializes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use labelforge::ir::io_json::fuzz_annotations_json;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    fuzz_annotations_json(data);
});
