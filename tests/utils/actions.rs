use axum::http::{Method, StatusCode};
use serde_json::json;

use super::setup::TestSetup;

// ============================================================================
// Common request sequences
// ============================================================================

pub const PASSWORD: &str = "Secret123!";

impl TestSetup {
    pub async fn register(&self, username: &str, email: &str) -> i64 {
        let response = self
            .send(
                Method::POST,
                "/register",
                None,
                Some(json!({"username": username, "email": email, "password": PASSWORD})),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.data()["user"]["id"].as_i64().unwrap()
    }

    pub async fn login(&self, email: &str) -> String {
        let response = self
            .send(
                Method::POST,
                "/login",
                None,
                Some(json!({"email": email, "password": PASSWORD})),
            )
            .await;
        response.assert_status(StatusCode::OK);
        response.data()["token"].as_str().unwrap().to_string()
    }

    /// Registers and logs in, returning a token
    pub async fn signed_in(&self, username: &str) -> String {
        let email = format!("{}@example.com", username);
        self.register(username, &email).await;
        self.login(&email).await
    }

    pub async fn create_exercise(&self, token: &str, name: &str) -> i64 {
        let response = self
            .send(
                Method::POST,
                "/api/exercises",
                Some(token),
                Some(json!({"name": name, "category": "strength", "primary_muscle": "chest"})),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.id()
    }

    pub async fn create_template(&self, token: &str, name: &str, lines: &[(i64, i32)]) -> i64 {
        let exercises: Vec<_> = lines
            .iter()
            .map(|(exercise_id, sets)| json!({"exercise_id": exercise_id, "sets": sets}))
            .collect();
        let response = self
            .send(
                Method::POST,
                "/api/me/templates",
                Some(token),
                Some(json!({"name": name, "description": "", "exercises": exercises})),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.id()
    }

    pub async fn create_workout(
        &self,
        token: &str,
        template_id: i64,
        name: &str,
        entries: &[(i64, i32, i32, f64)],
    ) -> i64 {
        let response = self
            .send(
                Method::POST,
                "/api/me/workouts",
                Some(token),
                Some(workout_body(template_id, name, entries)),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.id()
    }
}

pub fn workout_body(
    template_id: i64,
    name: &str,
    entries: &[(i64, i32, i32, f64)],
) -> serde_json::Value {
    let entries: Vec<_> = entries
        .iter()
        .map(|(exercise_id, set_number, reps, weight)| {
            json!({
                "exercise_id": exercise_id,
                "set_number": set_number,
                "reps": reps,
                "weight": weight
            })
        })
        .collect();
    json!({"template_id": template_id, "name": name, "notes": "", "entries": entries})
}
