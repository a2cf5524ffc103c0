// [libs/domain/models/src/lib.rs]

pub mod alert;
pub mod audit;
pub mod command;
pub mod device;
pub mod entitlement;
pub mod notification;
pub mod ota;
pub mod rollup;
pub mod site;
pub mod telemetry;
pub mod tenant;
pub mod user;
pub mod weather;

pub use alert::{AlertEvent, AlertEventStatus, AlertRule, AlertRuleKind, AlertSeverity, RuleDefaults};
pub use audit::{ActorType, AuditRecord};
pub use command::{Command, CommandStatus, CommandType};
pub use device::{Device, DeviceStatus, DeviceTwin};
pub use entitlement::{Entitlement, EntitlementKey, EntitlementScope};
pub use notification::{ChannelType, NotificationChannel, NotificationEvent, NotificationStatus};
pub use ota::{FirmwarePackage, OtaJob, OtaJobStatus, OtaTargetType};
pub use rollup::DailyRollup;
pub use site::{LocationSource, Site};
pub use telemetry::{GeoFix, MetricValue, TelemetryReading};
pub use tenant::{Membership, Role, Tenant, TenantStatus, TenantType};
pub use user::{User, UserStatus};
pub use weather::WeatherObservation;
