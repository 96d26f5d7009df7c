pub mod refresher;
pub mod render;
pub mod server;

pub use refresher::{refresh_loop, refresh_once, DashboardState, Snapshot, WindowReader};
pub use render::{render, LineSeries, Quantity, SeriesPoint};
pub use server::{router, serve, AppState};
