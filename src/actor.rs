// Actor identity and reviewer authority.
//
// Actors are resolved by the surrounding application's identity provider and
// handed in read-only; this subsystem never mutates them.

use serde::{Deserialize, Serialize};

use crate::requests::types::{id_newtype, RequestedRole, RoleRequest};

id_newtype!(ActorId);
id_newtype!(SchoolId);

/// Platform roles, ordered from least to most authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    HomeroomTeacher,
    GradeTeacher,
    SchoolAdmin,
    DistrictAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HomeroomTeacher => "homeroom_teacher",
            Role::GradeTeacher => "grade_teacher",
            Role::SchoolAdmin => "school_admin",
            Role::DistrictAdmin => "district_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "homeroom_teacher" => Some(Role::HomeroomTeacher),
            "grade_teacher" => Some(Role::GradeTeacher),
            "school_admin" => Some(Role::SchoolAdmin),
            "district_admin" => Some(Role::DistrictAdmin),
            _ => None,
        }
    }
}

/// An authenticated identity with a role and optional home-school scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    pub school_id: Option<SchoolId>,
}

impl Actor {
    pub fn new(id: ActorId, role: Role, school_id: Option<SchoolId>) -> Self {
        Self {
            id,
            role,
            school_id,
        }
    }

    /// A reviewer must hold a role strictly above the request's scope.
    /// District admins decide any role request; school admins decide
    /// school-admin requests scoped to their own school and nothing else.
    pub fn may_decide_role_request(&self, request: &RoleRequest) -> bool {
        match self.role {
            Role::DistrictAdmin => true,
            Role::SchoolAdmin => {
                request.requested_role == RequestedRole::SchoolAdmin
                    && self.school_id.is_some()
                    && self.school_id == request.school_id
            }
            _ => false,
        }
    }

    /// Transfer requests span two schools, so only district admins decide
    /// them.
    pub fn may_decide_transfer(&self) -> bool {
        self.role == Role::DistrictAdmin
    }
}
