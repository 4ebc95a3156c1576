pub mod windows;

pub use windows::ScanWindows;
