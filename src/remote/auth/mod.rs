//! SSH authentication strategies.
//!
//! This module provides the Strategy pattern for SSH authentication:
//!
//! - `KeyAuth`: Public key authentication from a private key file
//! - `PasswordAuth`: Password authentication
//! - `EmptyInteractiveAuth`: Keyboard-interactive with empty answers
//! - `AuthChain`: Ordered list of strategies, first accepted wins

mod chain;
mod interactive;
mod key;
mod password;
mod traits;

pub use chain::AuthChain;
pub use interactive::EmptyInteractiveAuth;
pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
