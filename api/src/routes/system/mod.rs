pub mod health_route;
pub mod reset_route;
