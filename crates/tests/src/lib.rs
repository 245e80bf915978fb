#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod engine_tests;
#[cfg(test)]
mod matching_tests;
#[cfg(test)]
mod timeline_tests;
