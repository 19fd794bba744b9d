//! Cross-crate scenarios for the ECDS runtime.

#[cfg(test)]
mod bus_e2e;

#[cfg(test)]
mod list_threads;

#[cfg(test)]
mod runtime_e2e;
