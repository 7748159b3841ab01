//! Browser bindings for fogwarden: a fog handle per map plus logging setup.

use wasm_bindgen::prelude::*;

pub use handle::FogHandle;

mod handle;
mod options;
mod store;

#[cfg(all(test, target_arch = "wasm32"))]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

pub(crate) fn js_error(err: impl core::fmt::Display) -> JsValue {
    js_sys::Error::new(&err.to_string()).into()
}

#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    {
        console_error_panic_hook::set_once();
    }
}

/// Routes `log` output to the browser console, e.g. `initLogging("debug")`.
#[wasm_bindgen(js_name = initLogging)]
pub fn init_logging(level: &str) -> Result<(), JsValue> {
    let level: log::Level = level.parse().map_err(js_error)?;
    console_log::init_with_level(level).map_err(js_error)?;
    log::debug!("fogwarden logging at {}", level);
    Ok(())
}
