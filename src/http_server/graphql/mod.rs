use std::sync::Arc;

use async_graphql::http::GraphiQLSource;
use async_graphql::{EmptySubscription, MergedObject, Schema};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::Extension;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse};

use crate::http_server::bearer::request_user;
use crate::http_server::state::AppState;

mod context;
pub mod playlist_mutations;
pub mod playlist_queries;
pub mod user_mutations;
pub mod user_queries;

pub use context::RequestUser;
use playlist_mutations::PlaylistMutation;
use playlist_queries::PlaylistQuery;
use user_mutations::UserMutation;
use user_queries::UserQuery;

#[derive(Default, MergedObject)]
pub struct Query(PlaylistQuery, UserQuery);

#[derive(Default, MergedObject)]
pub struct Mutation(PlaylistMutation, UserMutation);

pub type AppSchema = Schema<Query, Mutation, EmptySubscription>;

pub async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Executes a request as the user its bearer token belongs to, or anonymously.
pub async fn graphql_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(schema): Extension<AppSchema>,
    headers: HeaderMap,
    request: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = request.into_inner();
    match request_user(&app_state, &headers).await {
        Ok(Some(user)) => request = request.data(RequestUser(user)),
        Ok(None) => {}
        Err(e) => log::debug!("Ignoring bearer token: {e}"),
    }
    schema.execute(request).await.into()
}

pub fn create_schema(app_state: Arc<AppState>) -> AppSchema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(app_state)
        .finish()
}
