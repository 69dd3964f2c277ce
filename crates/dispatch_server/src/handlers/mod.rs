pub mod buses;
pub mod hails;

pub async fn health() -> &'static str {
    "OK"
}
