pub mod cdp;
pub mod locator;
pub mod page;
pub mod session;

pub use locator::{FileInputHint, Locator};
pub use page::{
    BrowserLauncher, CdpPage, ChromeLauncher, ControlKind, ElementHandle, ElementInfo, Page,
};
pub use session::{find_browser_binary, list_available_browsers, BrowserEngine};
