#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = comprobante::mod11_check_digit(s);
        if let Ok(identity) = comprobante::AccessKey::decompose(s) {
            assert_eq!(identity.access_key().as_str(), s);
        }
    }
});
