// src/models/classroom.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'classrooms' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Classroom {
    pub id: i64,

    /// Owning teacher. Only this user (or an admin) may manage the
    /// classroom's quizzes.
    pub teacher_id: i64,

    pub name: String,
    pub description: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a classroom.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassroomRequest {
    #[validate(length(min = 1, max = 200, message = "Classroom name must not be empty."))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}
