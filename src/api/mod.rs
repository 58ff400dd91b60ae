use rocket::Route;

pub mod admin;
pub mod auth;
pub mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(auth::routes());
    routes.extend(voter::routes());
    routes
}
