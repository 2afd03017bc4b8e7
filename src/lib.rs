pub mod adapters;
pub mod app;
pub mod domain;
pub mod glue;

#[cfg(test)]
mod test_support;
