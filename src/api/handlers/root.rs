use axum::response::IntoResponse;

// axum handler for /
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn root_names_the_service() {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
