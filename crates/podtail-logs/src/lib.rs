//! Log tailing for podtail
//!
//! A [`Tail`] follows one container's log stream, filters and highlights
//! lines, and renders them through a [`Renderer`] into an [`Output`].

mod color;
mod filter;
mod output;
mod stdin;
mod tail;
mod template;
pub mod timestamp;

pub use color::{ColorError, Palette};
pub use filter::LineFilter;
pub use output::{Buffer, Output, SharedWriter};
pub use stdin::StdinTail;
pub use tail::{Tail, TailContext, TailError, TailHandle, TailOptions, TailState};
pub use template::{CustomTemplate, RenderError, Renderer, Template, TemplateError};
pub use timestamp::{Location, TimestampError, TimestampFormat};
