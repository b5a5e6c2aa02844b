pub mod replay;
pub mod send_test;

pub use replay::ReplayCommand;
pub use send_test::SendTestCommand;
