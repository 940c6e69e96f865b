#![no_main]

use compat_quake::shader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let _ = shader::parse_shader_script(&text);
});
