use crate::clients::tmdb::MovieDetails;
use serde::Serialize;

use super::{names_json, normalize_date};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MovieRow {
    pub id: i64,
    pub title: Option<String>,
    pub original_title: Option<String>,
    pub original_language: Option<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<i32>,
    pub status: Option<String>,
    pub tagline: Option<String>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub adult: Option<bool>,
    pub imdb_id: Option<String>,
    pub homepage: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genres: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovieCastRow {
    pub movie_id: i64,
    pub person_id: i64,
    /// Empty when the credit names no character.
    pub character: String,
    pub name: Option<String>,
    pub credit_id: Option<String>,
    pub cast_order: Option<i32>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovieCrewRow {
    pub movie_id: i64,
    pub person_id: i64,
    pub job: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub credit_id: Option<String>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovieBundle {
    pub movie: MovieRow,
    pub cast: Vec<MovieCastRow>,
    pub crew: Vec<MovieCrewRow>,
}

impl From<MovieDetails> for MovieBundle {
    fn from(details: MovieDetails) -> Self {
        let movie_id = details.id;
        let credits = details.credits.unwrap_or_default();

        let cast = credits
            .cast
            .into_iter()
            .map(|c| MovieCastRow {
                movie_id,
                person_id: c.id,
                character: c.character.unwrap_or_default(),
                name: c.name,
                credit_id: c.credit_id,
                cast_order: c.order,
                gender: c.gender,
                profile_path: c.profile_path,
            })
            .collect();

        let crew = credits
            .crew
            .into_iter()
            .map(|c| MovieCrewRow {
                movie_id,
                person_id: c.id,
                job: c.job.unwrap_or_default(),
                name: c.name,
                department: c.department,
                credit_id: c.credit_id,
                gender: c.gender,
                profile_path: c.profile_path,
            })
            .collect();

        let movie = MovieRow {
            id: movie_id,
            release_date: normalize_date(details.release_date.as_deref()),
            genres: names_json(details.genres.iter().map(|g| g.name.as_str())),
            title: details.title,
            original_title: details.original_title,
            original_language: details.original_language,
            overview: details.overview,
            runtime: details.runtime,
            status: details.status,
            tagline: details.tagline,
            popularity: details.popularity,
            vote_average: details.vote_average,
            vote_count: details.vote_count,
            budget: details.budget,
            revenue: details.revenue,
            adult: details.adult,
            imdb_id: details.imdb_id,
            homepage: details.homepage,
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
        };

        Self { movie, cast, crew }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::tmdb::{Genre, MovieCastMember, MovieCredits, MovieCrewMember};

    #[test]
    fn flattens_credits_and_normalizes_fields() {
        let details = MovieDetails {
            id: 5,
            title: Some("Four Rooms".into()),
            release_date: Some(String::new()),
            genres: vec![Genre {
                id: 35,
                name: "Comedy".into(),
            }],
            credits: Some(MovieCredits {
                cast: vec![
                    MovieCastMember {
                        id: 9,
                        character: Some("Lead".into()),
                        ..Default::default()
                    },
                    MovieCastMember {
                        id: 10,
                        character: None,
                        ..Default::default()
                    },
                ],
                crew: vec![MovieCrewMember {
                    id: 11,
                    job: Some("Director".into()),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        };

        let bundle = MovieBundle::from(details);

        assert_eq!(bundle.movie.id, 5);
        assert_eq!(bundle.movie.release_date, None);
        assert_eq!(bundle.movie.genres.as_deref(), Some(r#"["Comedy"]"#));
        assert_eq!(bundle.cast.len(), 2);
        assert!(bundle.cast.iter().all(|c| c.movie_id == 5));
        assert_eq!(bundle.cast[0].character, "Lead");
        assert_eq!(bundle.cast[1].character, "");
        assert_eq!(bundle.crew[0].job, "Director");
    }

    #[test]
    fn missing_credits_yield_no_rows() {
        let bundle = MovieBundle::from(MovieDetails {
            id: 7,
            ..Default::default()
        });
        assert!(bundle.cast.is_empty());
        assert!(bundle.crew.is_empty());
    }
}
