//! Render stage (C4): pure CPU transform from data to HTML, with error
//! page synthesis. Runs inline on the request coroutine or inside a worker.

mod core;

pub use core::{error_page, escape_html, not_found_page, render_route, RenderOutcome};
