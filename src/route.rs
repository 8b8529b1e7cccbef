//! Route definitions and shared application state

use std::sync::Arc;

use axum::middleware;
use axum::response::Response;
use axum::routing::{delete, get};
use axum::Router;

use crate::dispatch::Dispatcher;
use crate::handler::{
    create_private_url, delete_private_url, list_private_urls, resolve_private_url,
};
use crate::lifecycle::PrivateUrls;
use crate::middleware::auth_middleware;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub urls: PrivateUrls,
    pub dispatcher: Arc<Dispatcher<Response>>,
}

impl AppState {
    /// State with a dispatcher that has no subscribers
    pub fn new(urls: PrivateUrls) -> Self {
        Self::from_dispatcher(Dispatcher::new(urls))
    }

    pub fn from_dispatcher(dispatcher: Dispatcher<Response>) -> Self {
        Self {
            urls: dispatcher.urls().clone(),
            dispatcher: Arc::new(dispatcher),
        }
    }
}

/// Creates the application router
///
/// # Route Definitions
///
/// - `GET /{namespace}/{action}/{token}` - resolves a private URL (public)
/// - `GET /api/urls` - lists records with pagination
/// - `POST /api/urls` - creates a record
/// - `DELETE /api/urls/{action}/{token}` - deletes a record
///
/// `/api` routes go through [`auth_middleware`].
///
/// # Example Usage
///
/// ```no_run
/// # use std::sync::Arc;
/// # use privateurl::config::Settings;
/// # use privateurl::database::RecordStore;
/// # use privateurl::lifecycle::PrivateUrls;
/// # use privateurl::route::{create_app, AppState};
/// let store = RecordStore::open("data.db").unwrap();
/// let urls = PrivateUrls::new(store, Arc::new(Settings::default()));
/// let app = create_app(AppState::new(urls));
/// // axum::serve(listener, app).await.unwrap();
/// ```
pub fn create_app(state: AppState) -> Router {
    // Management routes, guarded by the shared secret when one is configured
    let api_routes = Router::new()
        .route("/urls", get(list_private_urls).post(create_private_url))
        .route("/urls/{action}/{token}", delete(delete_private_url))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Dispatch path lives under the configured namespace, e.g. /privateurl/{action}/{token}
    let resolve_path = format!(
        "/{}/{{action}}/{{token}}",
        state.urls.settings().url_namespace
    );

    Router::new()
        // Public endpoint - resolves a token and notifies subscribers
        .route(&resolve_path, get(resolve_private_url))
        // Mount API routes under /api
        .nest("/api", api_routes)
        // Inject the application state into all handlers
        .with_state(state)
}
