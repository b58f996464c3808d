pub mod remote_session;

pub use remote_session::RemoteSession;
