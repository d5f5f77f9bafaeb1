pub mod card;
pub mod status_indicator;
pub mod toast;
