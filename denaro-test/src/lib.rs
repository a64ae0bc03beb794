//! Shared test bootstrap for the Denaro workspace.
//!
//! Call [`init`] at the start of every test. It installs the tracing
//! subscriber and the color-eyre panic/error hooks exactly once, no matter how
//! many tests in the binary call it.

use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

lazy_static::lazy_static! {
    static ref INSTALLED: () = {
        tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(ErrorLayer::default())
            .with(EnvFilter::from_default_env())
            .init();

        color_eyre::config::HookBuilder::default()
            .add_frame_filter(Box::new(|frames| {
                frames.retain(|frame| {
                    frame
                        .name
                        .as_ref()
                        .map(|name| name.starts_with("denaro"))
                        .unwrap_or(false)
                });
            }))
            .install()
            .expect("install() is only called once");
    };
}

/// Initialize tracing and error reports for a test binary.
pub fn init() {
    lazy_static::initialize(&INSTALLED);
}

pub mod prelude {
    pub use color_eyre::eyre::{bail, eyre, Report};
    pub type Result<T, E = Report> = std::result::Result<T, E>;
}
