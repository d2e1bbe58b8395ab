use crate::clients::{Catalog, CatalogError};
use crate::config::TmdbConfig;
use crate::domain::{CatalogId, DateWindow, EntityKind};
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;
use url::Url;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangesPage {
    #[serde(deserialize_with = "null_as_default")]
    pub results: Vec<ChangedEntry>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangedEntry {
    pub id: i64,
    #[serde(default)]
    pub adult: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Network {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieDetails {
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
    #[serde(deserialize_with = "null_as_default")]
    pub genres: Vec<Genre>,
    pub credits: Option<MovieCredits>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieCredits {
    #[serde(deserialize_with = "null_as_default")]
    pub cast: Vec<MovieCastMember>,
    #[serde(deserialize_with = "null_as_default")]
    pub crew: Vec<MovieCrewMember>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieCastMember {
    pub id: i64,
    pub name: Option<String>,
    pub character: Option<String>,
    pub credit_id: Option<String>,
    pub order: Option<i32>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MovieCrewMember {
    pub id: i64,
    pub name: Option<String>,
    pub job: Option<String>,
    pub department: Option<String>,
    pub credit_id: Option<String>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TvDetails {
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
    #[serde(rename = "type")]
    pub show_type: Option<String>,
    pub in_production: Option<bool>,
    pub popularity: Option<f64>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i64>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub genres: Vec<Genre>,
    #[serde(deserialize_with = "null_as_default")]
    pub networks: Vec<Network>,
    pub aggregate_credits: Option<AggregateCredits>,
}

/// Show-level credits aggregated over every season; each person carries the
/// list of roles (cast) or jobs (crew) they held on the show.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggregateCredits {
    #[serde(deserialize_with = "null_as_default")]
    pub cast: Vec<AggregateCastMember>,
    #[serde(deserialize_with = "null_as_default")]
    pub crew: Vec<AggregateCrewMember>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggregateCastMember {
    pub id: i64,
    pub name: Option<String>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
    pub popularity: Option<f64>,
    pub total_episode_count: Option<i32>,
    #[serde(deserialize_with = "null_as_default")]
    pub roles: Vec<CastRole>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CastRole {
    pub credit_id: Option<String>,
    pub character: Option<String>,
    pub episode_count: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AggregateCrewMember {
    pub id: i64,
    pub name: Option<String>,
    pub department: Option<String>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
    pub total_episode_count: Option<i32>,
    #[serde(deserialize_with = "null_as_default")]
    pub jobs: Vec<CrewJob>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CrewJob {
    pub credit_id: Option<String>,
    pub job: Option<String>,
    pub episode_count: Option<i32>,
}

#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    read_access_token: Option<String>,
    language: String,
}

impl TmdbClient {
    pub fn new(config: &TmdbConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(crate::constants::USER_AGENT)
            .timeout(Duration::from_secs(u64::from(
                config.request_timeout_seconds.max(1),
            )))
            .build()?;

        Url::parse(&config.base_url)
            .map_err(|e| CatalogError::InvalidRequest(format!("tmdb.base_url: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: (!config.api_key.is_empty()).then(|| config.api_key.clone()),
            read_access_token: config.read_access_token.clone(),
            language: config.language.clone(),
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, CatalogError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| CatalogError::InvalidRequest(e.to_string()))?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(key) = &self.api_key {
                query.append_pair("api_key", key);
            }
            for (name, value) in params {
                query.append_pair(name, value);
            }
        }

        Ok(url)
    }

    /// GETs `url` and decodes the JSON body; `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, CatalogError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.read_access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(path = url.path(), "Catalog returned 404");
            return Ok(None);
        }

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let body = response.json::<T>().await?;
        Ok(Some(body))
    }
}

#[async_trait::async_trait]
impl Catalog for TmdbClient {
    async fn changes(
        &self,
        kind: EntityKind,
        window: DateWindow,
        page: u32,
    ) -> Result<ChangesPage, CatalogError> {
        let url = self.url(
            &format!("{}/changes", kind.endpoint()),
            &[
                ("start_date", window.start.format("%Y-%m-%d").to_string()),
                ("end_date", window.end.format("%Y-%m-%d").to_string()),
                ("page", page.to_string()),
            ],
        )?;

        self.get_json(url).await?.ok_or_else(|| CatalogError::Status {
            status: 404,
            body: format!("{kind} change feed not found"),
            retry_after: None,
        })
    }

    async fn movie(&self, id: CatalogId) -> Result<Option<MovieDetails>, CatalogError> {
        let url = self.url(
            &format!("movie/{id}"),
            &[
                ("append_to_response", "credits".to_string()),
                ("language", self.language.clone()),
            ],
        )?;
        self.get_json(url).await
    }

    async fn tv_show(&self, id: CatalogId) -> Result<Option<TvDetails>, CatalogError> {
        let url = self.url(
            &format!("tv/{id}"),
            &[
                ("append_to_response", "aggregate_credits".to_string()),
                ("language", self.language.clone()),
            ],
        )?;
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_api_key_and_params() {
        let config = TmdbConfig {
            api_key: "secret".to_string(),
            ..TmdbConfig::default()
        };
        let client = TmdbClient::new(&config).unwrap();
        let url = client
            .url("movie/changes", &[("page", "2".to_string())])
            .unwrap();

        assert_eq!(url.path(), "/3/movie/changes");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("api_key".to_string(), "secret".to_string())));
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
    }

    #[test]
    fn bearer_only_config_omits_api_key() {
        let config = TmdbConfig {
            read_access_token: Some("token".to_string()),
            ..TmdbConfig::default()
        };
        let client = TmdbClient::new(&config).unwrap();
        let url = client.url("tv/1", &[]).unwrap();
        assert!(url.query_pairs().all(|(k, _)| k != "api_key"));
    }

    #[test]
    fn decodes_changes_page() {
        let json = r#"{"results":[{"id":5,"adult":false},{"id":9,"adult":null}],"page":1,"total_pages":3,"total_results":250}"#;
        let page: ChangesPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.results[1].id, 9);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn decodes_movie_with_nulls() {
        let json = r#"{
            "id": 5,
            "title": "Four Rooms",
            "release_date": "",
            "runtime": null,
            "genres": null,
            "credits": {
                "cast": [{"id": 9, "name": "Tim Roth", "character": "Ted", "order": 0, "credit_id": "abc"}],
                "crew": [{"id": 11, "name": "Allison Anders", "job": "Director", "department": "Directing"}]
            }
        }"#;
        let movie: MovieDetails = serde_json::from_str(json).unwrap();
        assert_eq!(movie.id, 5);
        assert!(movie.genres.is_empty());
        assert_eq!(movie.runtime, None);
        let credits = movie.credits.unwrap();
        assert_eq!(credits.cast[0].character.as_deref(), Some("Ted"));
        assert_eq!(credits.crew[0].job.as_deref(), Some("Director"));
    }

    #[test]
    fn decodes_tv_aggregate_credits() {
        let json = r#"{
            "id": 1399,
            "name": "Game of Thrones",
            "type": "Scripted",
            "networks": [{"id": 49, "name": "HBO"}],
            "aggregate_credits": {
                "cast": [{
                    "id": 22970, "name": "Peter Dinklage", "total_episode_count": 67,
                    "roles": [
                        {"credit_id": "a", "character": "Tyrion Lannister", "episode_count": 67},
                        {"credit_id": "b", "character": "Narrator", "episode_count": 1}
                    ]
                }],
                "crew": [{
                    "id": 9813, "name": "David Benioff", "department": "Writing",
                    "jobs": [{"credit_id": "c", "job": "Writer", "episode_count": 20}]
                }]
            }
        }"#;
        let show: TvDetails = serde_json::from_str(json).unwrap();
        assert_eq!(show.show_type.as_deref(), Some("Scripted"));
        assert_eq!(show.networks[0].name, "HBO");
        let credits = show.aggregate_credits.unwrap();
        assert_eq!(credits.cast[0].roles.len(), 2);
        assert_eq!(credits.crew[0].jobs[0].job.as_deref(), Some("Writer"));
    }
}
