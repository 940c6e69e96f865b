#![no_main]

use compat_quake::bsp_q3;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = bsp_q3::parse_bsp(data);
});
