pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod language;
pub mod runtime;

#[cfg(test)]
mod tests;
