#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Parse → encode → parse must not panic at any step, and the access key survives.
        if let Ok(doc) = comprobante::factura::from_xml(s) {
            if let Ok(encoded) = comprobante::factura::to_xml(&doc) {
                assert_eq!(encoded.access_key, doc.access_key());
                let _ = comprobante::factura::from_xml(encoded.as_str());
            }
        }
    }
});
