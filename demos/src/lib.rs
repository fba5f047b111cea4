//! Usage walkthroughs of `hpsmr`, written as tests.

#[cfg(test)]
mod examples;
