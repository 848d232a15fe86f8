pub mod action;
pub mod desktop;
pub mod executor;
pub mod parse;

pub use action::{catalog, render_catalog, CatalogEntry, DesktopAction};
pub use desktop::{render_screen_map, Desktop, DryRunDesktop, ScreenElement};
pub use executor::ActionExecutor;
pub use parse::{parse_tool_calls, ParsedCall};
