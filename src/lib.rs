//! # mulesieve
//!
//! Resumable record extraction for oceanographic instrument streams. Bytes
//! are pulled from a [`source::ByteSource`], split into data spans by a
//! span-level [`sieve::Sieve`], partitioned into candidate records by a
//! record-level sieve and decoded into typed [`decode::Record`]s. The cursor
//! state ([`ranges::CursorState`]) is small, serialisable, and lets a fresh
//! engine continue exactly where a previous one stopped.
//!
//! ```no_run
//! use mulesieve::config;
//! use mulesieve::engine::{CollectingSink, ExtractionEngine};
//! use mulesieve::source::FileSource;
//!
//! let loaded = config::load_config(None).unwrap();
//! let format = loaded.config.format("wfp_eng_sio_mule").unwrap();
//! let input = FileSource::open("node58p1.dat".as_ref()).unwrap();
//! let mut engine =
//!     ExtractionEngine::from_format(format, input, None, loaded.config.engine_options()).unwrap();
//! let mut sink = CollectingSink::new();
//! let records = engine.get_records(100, &mut sink).unwrap();
//! let state = engine.state();
//! # let _ = (records, state);
//! ```

pub mod checkpoint;
pub mod chunk;
pub mod cli;
pub mod config;
pub mod constants;
pub mod decode;
pub mod engine;
pub mod format;
pub mod logging;
pub mod ranges;
pub mod sieve;
pub mod sink;
pub mod source;
pub mod util;
