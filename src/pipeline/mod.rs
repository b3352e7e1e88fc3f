//! Pipeline stages for PDF distillation.
//!
//! Each submodule implements exactly one step and talks to the outside world
//! only through [`process`], the single place where external tools are
//! spawned, timed and killed.
//!
//! ## Data Flow
//!
//! ```text
//! rendered.pdf ──▶ pagecount ──▶ split ──▶ distill (× N chunks) ──▶ split::merge
//!                  (gs query)    (qpdf)    (gs pdfwrite)             (qpdf)
//! ```
//!
//! 1. [`pagecount`] asks the distiller for the page count, needed to report
//!    it and to partition parallel work
//! 2. [`split`] plans chunks and fans out; falls back to one [`distill`] run
//!    when parallelism or the page count do not allow splitting
//! 3. [`distill`] runs the engine once with an argument list from [`args`]
//!    and, for colour-managed presets, a control file from [`control`]

pub mod args;
pub mod control;
pub mod distill;
pub mod pagecount;
pub mod process;
pub mod split;
