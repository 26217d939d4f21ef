//! Fuzz target for request path validation.
//!
//! Segments accepted by the resolver must never name more than one directory
//! entry, and only the two allowed services may parse.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sourcepods_git::Service;
use sourcepods_storage::repo::check_segment;

fuzz_target!(|data: &[u8]| {
    let input = String::from_utf8_lossy(data);

    if check_segment(&input).is_ok() {
        assert!(!input.is_empty());
        assert!(input != "." && input != "..");
        assert!(!input.contains(['/', '\\', '\0']));
    }

    if let Ok(service) = Service::from_query(&input) {
        assert!(Service::ALL.contains(&service));
        assert!(input == service.as_str() || input == service.wire_name());
    }
});
