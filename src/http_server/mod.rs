pub mod app;
pub mod bearer;
pub mod error;
pub mod graphql;
pub mod graphql_error;
pub mod http_routes;
pub mod state;
