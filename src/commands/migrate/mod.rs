mod dedup;
mod load;
mod normalize;
mod report;
mod run;
mod source;
#[cfg(test)]
mod tests;
mod types;
mod validate;

pub use run::run;
