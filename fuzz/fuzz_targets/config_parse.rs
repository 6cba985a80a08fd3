#![no_main]

use libfuzzer_sys::fuzz_target;
use udsock_core::config::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = Config::from_toml_str(text) {
        assert!(config.endpoint.backlog > 0);
        let rendered = config.to_toml_string().expect("valid config serializes");
        let reparsed = Config::from_toml_str(&rendered).expect("rendered config parses");
        assert_eq!(reparsed.endpoint, config.endpoint);
    }
});
