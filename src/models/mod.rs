pub mod mirror;
pub mod repo;
pub mod status;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::mirror::{self, Entity as Mirror};
    pub use super::repo::{self, Entity as Repo};
    pub use super::status::{self, Entity as Status};
}
