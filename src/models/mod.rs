pub mod consultation;
pub mod exam;
pub mod medication;
pub mod notification;
pub mod user;
pub mod vital;

pub use consultation::*;
pub use exam::*;
pub use medication::*;
pub use notification::*;
pub use user::*;
pub use vital::*;
