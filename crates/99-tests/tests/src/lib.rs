//! Cross-driver test suite for the link transport.

#[cfg(test)]
mod support;

#[cfg(test)]
mod native_e2e;

#[cfg(test)]
mod flow_control;

#[cfg(test)]
mod fault_paths;
