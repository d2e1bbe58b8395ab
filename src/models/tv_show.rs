use crate::clients::tmdb::TvDetails;
use serde::Serialize;

use super::{names_json, normalize_date};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TvShowRow {
    pub id: i64,
    pub name: Option<String>,
    pub original_name: Option<String>,
    pub original_language: Option<String>,
    pub overview: Option<String>,
    pub first_air_date: Option<String>,
    pub last_air_date: Option<String>,
    pub number_of_seasons: Option<i32>,
    pub number_of_episodes: Option<i32>,
    pub status: Option<String>,
    pub show_type: Option<String>,
    pub in_production: Option<bool>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genres: Option<String>,
    pub networks: Option<String>,
}

/// One (person, character) pair on a show.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TvCastRow {
    pub tv_id: i64,
    pub person_id: i64,
    pub character: String,
    pub name: Option<String>,
    pub credit_id: Option<String>,
    pub episode_count: Option<i32>,
    pub total_episode_count: Option<i32>,
    pub gender: Option<i32>,
    pub popularity: Option<f64>,
    pub profile_path: Option<String>,
}

/// One (person, job) pair on a show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TvCrewRow {
    pub tv_id: i64,
    pub person_id: i64,
    pub job: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub credit_id: Option<String>,
    pub episode_count: Option<i32>,
    pub total_episode_count: Option<i32>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TvBundle {
    pub show: TvShowRow,
    pub cast: Vec<TvCastRow>,
    pub crew: Vec<TvCrewRow>,
}

impl From<TvDetails> for TvBundle {
    fn from(details: TvDetails) -> Self {
        let tv_id = details.id;
        let credits = details.aggregate_credits.unwrap_or_default();

        let mut cast = Vec::new();
        for member in credits.cast {
            for role in &member.roles {
                cast.push(TvCastRow {
                    tv_id,
                    person_id: member.id,
                    character: role.character.clone().unwrap_or_default(),
                    name: member.name.clone(),
                    credit_id: role.credit_id.clone(),
                    episode_count: role.episode_count,
                    total_episode_count: member.total_episode_count,
                    gender: member.gender,
                    popularity: member.popularity,
                    profile_path: member.profile_path.clone(),
                });
            }
        }

        let mut crew = Vec::new();
        for member in credits.crew {
            for job in &member.jobs {
                crew.push(TvCrewRow {
                    tv_id,
                    person_id: member.id,
                    job: job.job.clone().unwrap_or_default(),
                    name: member.name.clone(),
                    department: member.department.clone(),
                    credit_id: job.credit_id.clone(),
                    episode_count: job.episode_count,
                    total_episode_count: member.total_episode_count,
                    gender: member.gender,
                    profile_path: member.profile_path.clone(),
                });
            }
        }

        let show = TvShowRow {
            id: tv_id,
            first_air_date: normalize_date(details.first_air_date.as_deref()),
            last_air_date: normalize_date(details.last_air_date.as_deref()),
            genres: names_json(details.genres.iter().map(|g| g.name.as_str())),
            networks: names_json(details.networks.iter().map(|n| n.name.as_str())),
            name: details.name,
            original_name: details.original_name,
            original_language: details.original_language,
            overview: details.overview,
            number_of_seasons: details.number_of_seasons,
            number_of_episodes: details.number_of_episodes,
            status: details.status,
            show_type: details.show_type,
            in_production: details.in_production,
            popularity: details.popularity,
            vote_average: details.vote_average,
            vote_count: details.vote_count,
            poster_path: details.poster_path,
            backdrop_path: details.backdrop_path,
        };

        Self { show, cast, crew }
    }
}
