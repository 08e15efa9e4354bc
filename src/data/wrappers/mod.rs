/// Memory-mapped file backend
pub mod mmap;
