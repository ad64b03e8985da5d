//! Skips wiremock-backed tests in sandboxes that cannot bind localhost.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "GALLERY_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` (and explains why) when sockets are unavailable.
///
/// With `GALLERY_REQUIRE_SOCKET_TESTS=1` an unavailable socket fails the test instead.
#[track_caller]
#[allow(dead_code)]
pub fn mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let location = Location::caller();
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();
    async move {
        if bindable {
            return Some(MockServer::start().await);
        }
        let message = format!(
            "[socket-bound-test] cannot bind localhost at {}:{}",
            location.file(),
            location.line()
        );
        assert!(!sockets_required(), "{message}; unset {REQUIRE_ENV} to allow skipping");
        eprintln!("{message}; skipping");
        None
    }
}
