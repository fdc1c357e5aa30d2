mod r2;

pub use r2::R2Storage;
