pub mod prelude {
    pub use super::last_updates::Entity as LastUpdates;
    pub use super::movie_cast::Entity as MovieCast;
    pub use super::movie_crew::Entity as MovieCrew;
    pub use super::movies::Entity as Movies;
    pub use super::tv_show_cast::Entity as TvShowCast;
    pub use super::tv_show_crew::Entity as TvShowCrew;
    pub use super::tv_shows::Entity as TvShows;
}

pub mod last_updates;
pub mod movie_cast;
pub mod movie_crew;
pub mod movies;
pub mod tv_show_cast;
pub mod tv_show_crew;
pub mod tv_shows;
