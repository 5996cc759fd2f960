pub mod analyzer;
pub mod classifier;
pub mod controller;
pub mod harvester;
pub mod login;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod session;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod wait;
pub mod webdriver_page;
