//! Domain records served by the OOTD API.
//!
//! Field names follow the API's camelCase JSON. Timestamps stay as the
//! server's ISO-8601 strings; the sync layer never interprets them.

use crate::entity::Entity;
use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Regular user.
    User,
    /// Administrator.
    Admin,
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationLevel {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

/// Sky condition of a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkyStatus {
    /// Clear sky.
    Clear,
    /// Mostly cloudy.
    MostlyCloudy,
    /// Cloudy.
    Cloudy,
}

/// Precipitation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecipitationType {
    /// None.
    None,
    /// Rain.
    Rain,
    /// Rain and snow.
    RainSnow,
    /// Snow.
    Snow,
    /// Shower.
    Shower,
}

/// A user account (admin listing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    /// User id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Email address.
    pub email: String,
    /// Display name.
    pub name: String,
    /// Account role.
    pub role: Role,
    /// Linked OAuth providers.
    #[serde(default)]
    pub linked_o_auth_providers: Vec<String>,
    /// Whether the account is locked.
    #[serde(default)]
    pub locked: bool,
}

/// Minimal user reference embedded in other records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// User id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

/// A user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    /// Owner id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Gender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    /// Birth date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
    /// Temperature sensitivity (1-5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_sensitivity: Option<u8>,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

/// A clothes attribute value with its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClothesAttributeWithDefDto {
    /// Definition id.
    pub definition_id: String,
    /// Definition name.
    pub definition_name: String,
    /// Allowed values.
    #[serde(default)]
    pub selectable_values: Vec<String>,
    /// Chosen value.
    pub value: String,
}

/// A clothes item in a closet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClothesDto {
    /// Clothes id.
    pub id: String,
    /// Owner id.
    pub owner_id: String,
    /// Name.
    pub name: String,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Clothes type (`TOP`, `BOTTOM`, ...).
    #[serde(rename = "type")]
    pub clothes_type: String,
    /// Attributes.
    #[serde(default)]
    pub attributes: Vec<ClothesAttributeWithDefDto>,
}

/// A clothes attribute definition (admin catalog).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClothesAttributeDefDto {
    /// Definition id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Name.
    pub name: String,
    /// Allowed values.
    #[serde(default)]
    pub selectable_values: Vec<String>,
}

/// Temperature reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureDto {
    /// Current value.
    pub current: f64,
    /// Difference to the previous day.
    #[serde(default)]
    pub compared_to_day_before: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
}

/// Precipitation reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecipitationDto {
    /// Kind.
    #[serde(rename = "type")]
    pub precipitation_type: PrecipitationType,
    /// Amount in mm.
    #[serde(default)]
    pub amount: f64,
    /// Probability (0-1).
    #[serde(default)]
    pub probability: f64,
}

/// A single forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherDto {
    /// Forecast id.
    pub id: String,
    /// When the forecast was produced.
    pub forecasted_at: String,
    /// Forecast target time.
    pub forecast_at: String,
    /// Sky condition.
    pub sky_status: SkyStatus,
    /// Precipitation.
    pub precipitation: PrecipitationDto,
    /// Temperature.
    pub temperature: TemperatureDto,
}

/// Weather summary embedded in a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSummaryDto {
    /// Forecast id.
    pub weather_id: String,
    /// Sky condition.
    pub sky_status: SkyStatus,
    /// Precipitation.
    pub precipitation: PrecipitationDto,
    /// Temperature.
    pub temperature: TemperatureDto,
}

/// A clothes item worn in a feed or recommended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OotdDto {
    /// Clothes id.
    pub clothes_id: String,
    /// Name.
    pub name: String,
    /// Image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Clothes type.
    #[serde(rename = "type")]
    pub clothes_type: String,
    /// Attributes.
    #[serde(default)]
    pub attributes: Vec<ClothesAttributeWithDefDto>,
}

/// A social feed post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDto {
    /// Feed id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
    /// Author.
    pub author: UserSummary,
    /// Weather at posting time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherSummaryDto>,
    /// Worn clothes.
    #[serde(default)]
    pub ootds: Vec<OotdDto>,
    /// Body text.
    pub content: String,
    /// Like counter.
    #[serde(default)]
    pub like_count: u64,
    /// Comment counter.
    #[serde(default)]
    pub comment_count: u64,
    /// Whether the viewer liked it.
    #[serde(default)]
    pub liked_by_me: bool,
}

/// A comment on a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    /// Comment id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Parent feed.
    pub feed_id: String,
    /// Author.
    pub author: UserSummary,
    /// Body text.
    pub content: String,
}

/// A follow edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowDto {
    /// Edge id.
    pub id: String,
    /// Followed user.
    pub followee: UserSummary,
    /// Following user.
    pub follower: UserSummary,
}

/// Follow counters for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowSummaryDto {
    /// Subject user.
    pub followee_id: String,
    /// Followers.
    pub follower_count: u64,
    /// Followings.
    pub following_count: u64,
    /// Whether the viewer follows the subject.
    pub followed_by_me: bool,
    /// Edge id of the viewer's follow, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followed_by_me_id: Option<String>,
    /// Whether the subject follows the viewer.
    pub following_me: bool,
}

/// Clothes recommended for a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationDto {
    /// Forecast id.
    pub weather_id: String,
    /// Viewer id.
    pub user_id: String,
    /// Recommended items.
    #[serde(default)]
    pub clothes: Vec<OotdDto>,
}

/// A notification delivered over the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDto {
    /// Notification id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Recipient.
    pub receiver_id: String,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Severity.
    pub level: NotificationLevel,
}

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageDto {
    /// Message id.
    pub id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Sender.
    pub sender: UserSummary,
    /// Receiver.
    pub receiver: UserSummary,
    /// Body.
    pub content: String,
}

macro_rules! entity_by {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl Entity for $ty {
                fn id(&self) -> &str {
                    &self.$field
                }
            }
        )*
    };
}

entity_by! {
    UserDto => id,
    ProfileDto => user_id,
    ClothesDto => id,
    ClothesAttributeDefDto => id,
    WeatherDto => id,
    FeedDto => id,
    CommentDto => id,
    FollowDto => id,
    FollowSummaryDto => followee_id,
    RecommendationDto => weather_id,
    NotificationDto => id,
    DirectMessageDto => id,
}
