#![allow(dead_code)]

pub mod mock_engine;

use std::sync::Once;

static LOG_INIT: Once = Once::new();

pub fn init_log() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
