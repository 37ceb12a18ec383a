pub mod fetch_window;
pub mod indicativo;
pub mod station;
pub mod weather_record;
