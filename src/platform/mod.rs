// ChapterSleuth - platform/mod.rs
//
// Platform abstraction layer: path resolution, configuration, file I/O.
// Dependencies: standard library, directories, memmap2.

pub mod config;
pub mod fs;
