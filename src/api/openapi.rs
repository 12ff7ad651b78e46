//! OpenAPI document for the HTTP surface.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::handlers::{auth, health, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::user_register::register,
        auth::user_login::login,
        auth::verification::send_verification_request,
        auth::verification::verify_account,
        auth::reset::forgot_password_token,
        auth::reset::reset_password,
        users::list_users,
        users::get_user,
        users::get_profile,
        users::update_user,
        users::delete_user,
        users::block_user,
        users::unblock_user,
    ),
    components(schemas(
        health::Health,
        auth::types::RegisterRequest,
        auth::types::LoginRequest,
        auth::types::SessionResponse,
        auth::types::AccountSummary,
        auth::types::VerifyAccountRequest,
        auth::types::ForgotPasswordRequest,
        auth::types::ResetPasswordRequest,
        auth::types::UpdateProfileRequest,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Registration, login, verification and password reset"),
        (name = "users", description = "Account roster and management")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
