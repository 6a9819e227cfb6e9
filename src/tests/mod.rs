//! End-to-end tests run against an in-process identity server.
//!
//! Every test that touches the data store is parameterized over both
//! execution disciplines; the blocking and non-blocking paths must make the
//! same requests and leave the cache in the same state.

mod support;
