// Library root: the desk server's modules, exposed for the binary and the
// integration tests.

pub mod app;
pub mod protocol;
pub mod ws_server;
