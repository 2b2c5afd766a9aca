//! Route paths.

pub const GET_API_HEALTH: &str = "/api/health";

pub const POST_DEVICE_CODE: &str = "/api/auth/device/code";
pub const POST_DEVICE_TOKEN: &str = "/api/auth/device/token";
pub const POST_DEVICE_AUTHORIZE: &str = "/api/auth/device/authorize";
pub const GET_DEVICE_VERIFY: &str = "/api/auth/device/verify";

pub const GET_AUTH_OAUTH_PROVIDER: &str = "/api/auth/oauth/{provider}";
pub const GET_AUTH_OAUTH_PROVIDER_CALLBACK: &str = "/api/auth/oauth/{provider}/callback";

pub const GET_AUTH_ME: &str = "/api/auth/me";
pub const GET_AUTH_STATUS: &str = "/api/auth/status";
pub const POST_AUTH_LOGOUT: &str = "/api/auth/logout";
pub const GET_AUTH_PROVIDERS: &str = "/api/auth/providers";
pub const DELETE_AUTH_PROVIDERS_PROVIDER: &str = "/api/auth/providers/{provider}";

pub const ADMIN_USERS_ID: &str = "/api/admin/users/{id}";
