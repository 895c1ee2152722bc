//! # Dispatcher Module
//!
//! The dispatcher turns `(method, path, query, body)` into one endpoint call.
//! It sits behind whatever transport receives requests; it never touches
//! sockets and every outcome, failures included, is a [`DispatchResponse`].
//!
//! ## Request Flow
//!
//! 1. The longest mounted URL prefix selects a root container (or a site walk)
//! 2. The rest of the URL, percent-decoded, extends the root into a *branch*
//! 3. The branch is resolved to a leaf unit:
//!    - a container answers with its default endpoint, its only endpoint, or
//!      its redirect for the request method (redirects may chain)
//!    - otherwise the final segment names an endpoint on the parent container
//! 4. Endpoint permissions are checked, parameters are bound and the handler
//!    runs
//!
//! ## Query Markers
//!
//! | Query | Answer |
//! |---|---|
//! | `?**` | `{"api": tree}` of every endpoint below the branch |
//! | `?**&reduce` | same, with single-child container runs merged (`a/b/c`) |
//! | `?*` | `{"help": description}` of the resolved endpoint |
//! | `?*&brief` | brief description |
//!
//! ## Status Codes
//!
//! | Outcome | Status |
//! |---|---|
//! | success | 200 `{"data": ..}` |
//! | argument or mandate error | 400 |
//! | endpoint not found, ambiguous container, missing permission | 403 |
//! | no such node or mount | 404 |
//! | method not accepted | 405 |
//! | handler failure or panic, redirect cycle, broken binding | 500 |

mod core;
mod describe;

pub use self::core::{DispatchResponse, Dispatcher, Request, StatusCategory};
pub use describe::{describe_tree, reduce, ENDPOINTS_KEY};
