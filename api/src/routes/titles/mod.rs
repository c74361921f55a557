pub mod search_titles_request;
pub mod search_titles_route;
