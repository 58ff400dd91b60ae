use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            admin::AdminCredentials,
            auth::{AuthToken, AUTH_TOKEN_COOKIE},
        },
        store::Store,
    },
};

pub fn routes() -> Vec<Route> {
    routes![authenticate, logout]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    store: Store,
    config: &State<Config>,
) -> Result<()> {
    let admin = store
        .find_admin_by_username(&credentials.username)
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No admin found with the provided username and password combination.".to_string(),
            )
        })?;

    let token = AuthToken::new(&admin);
    cookies.add(token.into_cookie(config)?);
    info!("Admin '{}' logged in", admin.username);

    Ok(())
}

/// Forget whoever is logged in, admin or voter.
#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[cfg(test)]
mod tests {
    use rocket::{http::ContentType, local::asynchronous::Client, serde::json::serde_json::json};

    use crate::model::db::admin::NewAdmin;

    use super::*;

    async fn insert_example_admin(store: &Store) {
        let admin = NewAdmin::try_from(AdminCredentials::example()).unwrap();
        store.insert_admin(admin).await.unwrap();
    }

    #[backend_test]
    async fn admin_authenticate_valid(client: Client, store: Store) {
        insert_example_admin(&store).await;

        let response = client
            .post(uri!(authenticate))
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn admin_authenticate_invalid(client: Client, store: Store) {
        insert_example_admin(&store).await;

        // Unknown username.
        let response = client
            .post(uri!(authenticate))
            .header(ContentType::JSON)
            .body(json!(AdminCredentials::empty()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));

        // Wrong password.
        let response = client
            .post(uri!(authenticate))
            .header(ContentType::JSON)
            .body(
                json!({
                    "username": AdminCredentials::example().username,
                    "password": "countevery2",
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(admin)]
    async fn logout_admin(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn logout_not_logged_in(client: Client) {
        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
    }
}
