//! Endpoint handlers organized by surface

pub mod ezbadminton;
pub mod records;

use axum::routing::{get, post, put};
use axum::Router;

use super::RecordService;

pub fn router(service: RecordService) -> Router {
    Router::new()
        .route(
            "/api/collections/:collection/records",
            get(records::list_records).post(records::create_record),
        )
        .route(
            "/api/collections/:collection/records/:id",
            get(records::get_record)
                .patch(records::update_record)
                .delete(records::delete_record),
        )
        .route("/api/ezbadminton/match_sets", put(ezbadminton::put_match_sets))
        .route(
            "/api/ezbadminton/competitions",
            post(ezbadminton::post_competition_matches),
        )
        .route(
            "/api/ezbadminton/tournament_organizer/exists",
            get(ezbadminton::organizer_exists),
        )
        .with_state(service)
}
