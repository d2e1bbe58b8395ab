use crate::constants::limits::INSERT_CHUNK;
use crate::entities::{
    movie_cast, movie_crew, movies, prelude::*, tv_show_cast, tv_show_crew, tv_shows,
};
use crate::models::{
    MovieBundle, MovieCastRow, MovieCrewRow, MovieRow, TvBundle, TvCastRow, TvCrewRow, TvShowRow,
};
use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Rows written by one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub entities: usize,
    pub associations: usize,
    pub pruned: usize,
}

impl std::ops::AddAssign for UpsertCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.entities += rhs.entities;
        self.associations += rhs.associations;
        self.pruned += rhs.pruned;
    }
}

pub struct CatalogRepository {
    conn: DatabaseConnection,
}

impl CatalogRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Writes movies and their credits in a single transaction.
    pub async fn upsert_movies(
        &self,
        bundles: &[MovieBundle],
        prune_stale: bool,
    ) -> Result<UpsertCounts> {
        let bundles = dedup_last(bundles.iter(), |b| b.movie.id);
        if bundles.is_empty() {
            return Ok(UpsertCounts::default());
        }

        let now = chrono::Utc::now().to_rfc3339();
        let ids: Vec<i64> = bundles.iter().map(|b| b.movie.id).collect();
        let cast = dedup_last(bundles.iter().flat_map(|b| b.cast.iter()), |c| {
            (c.movie_id, c.person_id, c.character.clone())
        });
        let crew = dedup_last(bundles.iter().flat_map(|b| b.crew.iter()), |c| {
            (c.movie_id, c.person_id, c.job.clone())
        });

        let txn = self.conn.begin().await?;

        for chunk in bundles.chunks(INSERT_CHUNK) {
            Movies::insert_many(chunk.iter().map(|b| movie_model(&b.movie, &now)))
                .on_conflict(
                    OnConflict::column(movies::Column::Id)
                        .update_columns([
                            movies::Column::Title,
                            movies::Column::OriginalTitle,
                            movies::Column::OriginalLanguage,
                            movies::Column::Overview,
                            movies::Column::ReleaseDate,
                            movies::Column::Runtime,
                            movies::Column::Status,
                            movies::Column::Tagline,
                            movies::Column::Popularity,
                            movies::Column::VoteAverage,
                            movies::Column::VoteCount,
                            movies::Column::Budget,
                            movies::Column::Revenue,
                            movies::Column::Adult,
                            movies::Column::ImdbId,
                            movies::Column::Homepage,
                            movies::Column::PosterPath,
                            movies::Column::BackdropPath,
                            movies::Column::Genres,
                            movies::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        let mut pruned = 0;
        if prune_stale {
            pruned += prune_movie_cast(&txn, &ids, &cast).await?;
            pruned += prune_movie_crew(&txn, &ids, &crew).await?;
        }

        for chunk in cast.chunks(INSERT_CHUNK) {
            MovieCast::insert_many(chunk.iter().map(|c| movie_cast_model(c, &now)))
                .on_conflict(
                    OnConflict::columns([
                        movie_cast::Column::MovieId,
                        movie_cast::Column::PersonId,
                        movie_cast::Column::Character,
                    ])
                    .update_columns([
                        movie_cast::Column::Name,
                        movie_cast::Column::CreditId,
                        movie_cast::Column::CastOrder,
                        movie_cast::Column::Gender,
                        movie_cast::Column::ProfilePath,
                        movie_cast::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        for chunk in crew.chunks(INSERT_CHUNK) {
            MovieCrew::insert_many(chunk.iter().map(|c| movie_crew_model(c, &now)))
                .on_conflict(
                    OnConflict::columns([
                        movie_crew::Column::MovieId,
                        movie_crew::Column::PersonId,
                        movie_crew::Column::Job,
                    ])
                    .update_columns([
                        movie_crew::Column::Name,
                        movie_crew::Column::Department,
                        movie_crew::Column::CreditId,
                        movie_crew::Column::Gender,
                        movie_crew::Column::ProfilePath,
                        movie_crew::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        Ok(UpsertCounts {
            entities: bundles.len(),
            associations: cast.len() + crew.len(),
            pruned,
        })
    }

    /// Writes TV shows and their aggregate credits in a single transaction.
    pub async fn upsert_tv_shows(
        &self,
        bundles: &[TvBundle],
        prune_stale: bool,
    ) -> Result<UpsertCounts> {
        let bundles = dedup_last(bundles.iter(), |b| b.show.id);
        if bundles.is_empty() {
            return Ok(UpsertCounts::default());
        }

        let now = chrono::Utc::now().to_rfc3339();
        let ids: Vec<i64> = bundles.iter().map(|b| b.show.id).collect();
        let cast = dedup_last(bundles.iter().flat_map(|b| b.cast.iter()), |c| {
            (c.tv_id, c.person_id, c.character.clone())
        });
        let crew = dedup_last(bundles.iter().flat_map(|b| b.crew.iter()), |c| {
            (c.tv_id, c.person_id, c.job.clone())
        });

        let txn = self.conn.begin().await?;

        for chunk in bundles.chunks(INSERT_CHUNK) {
            TvShows::insert_many(chunk.iter().map(|b| tv_show_model(&b.show, &now)))
                .on_conflict(
                    OnConflict::column(tv_shows::Column::Id)
                        .update_columns([
                            tv_shows::Column::Name,
                            tv_shows::Column::OriginalName,
                            tv_shows::Column::OriginalLanguage,
                            tv_shows::Column::Overview,
                            tv_shows::Column::FirstAirDate,
                            tv_shows::Column::LastAirDate,
                            tv_shows::Column::NumberOfSeasons,
                            tv_shows::Column::NumberOfEpisodes,
                            tv_shows::Column::Status,
                            tv_shows::Column::ShowType,
                            tv_shows::Column::InProduction,
                            tv_shows::Column::Popularity,
                            tv_shows::Column::VoteAverage,
                            tv_shows::Column::VoteCount,
                            tv_shows::Column::PosterPath,
                            tv_shows::Column::BackdropPath,
                            tv_shows::Column::Genres,
                            tv_shows::Column::Networks,
                            tv_shows::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        let mut pruned = 0;
        if prune_stale {
            pruned += prune_tv_cast(&txn, &ids, &cast).await?;
            pruned += prune_tv_crew(&txn, &ids, &crew).await?;
        }

        for chunk in cast.chunks(INSERT_CHUNK) {
            TvShowCast::insert_many(chunk.iter().map(|c| tv_cast_model(c, &now)))
                .on_conflict(
                    OnConflict::columns([
                        tv_show_cast::Column::TvId,
                        tv_show_cast::Column::PersonId,
                        tv_show_cast::Column::Character,
                    ])
                    .update_columns([
                        tv_show_cast::Column::Name,
                        tv_show_cast::Column::CreditId,
                        tv_show_cast::Column::EpisodeCount,
                        tv_show_cast::Column::TotalEpisodeCount,
                        tv_show_cast::Column::Gender,
                        tv_show_cast::Column::Popularity,
                        tv_show_cast::Column::ProfilePath,
                        tv_show_cast::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        for chunk in crew.chunks(INSERT_CHUNK) {
            TvShowCrew::insert_many(chunk.iter().map(|c| tv_crew_model(c, &now)))
                .on_conflict(
                    OnConflict::columns([
                        tv_show_crew::Column::TvId,
                        tv_show_crew::Column::PersonId,
                        tv_show_crew::Column::Job,
                    ])
                    .update_columns([
                        tv_show_crew::Column::Name,
                        tv_show_crew::Column::Department,
                        tv_show_crew::Column::CreditId,
                        tv_show_crew::Column::EpisodeCount,
                        tv_show_crew::Column::TotalEpisodeCount,
                        tv_show_crew::Column::Gender,
                        tv_show_crew::Column::ProfilePath,
                        tv_show_crew::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;

        Ok(UpsertCounts {
            entities: bundles.len(),
            associations: cast.len() + crew.len(),
            pruned,
        })
    }

    pub async fn get_movie(&self, id: i64) -> Result<Option<movies::Model>> {
        Ok(Movies::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_tv_show(&self, id: i64) -> Result<Option<tv_shows::Model>> {
        Ok(TvShows::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_movie_cast(&self, movie_id: i64) -> Result<Vec<movie_cast::Model>> {
        Ok(MovieCast::find()
            .filter(movie_cast::Column::MovieId.eq(movie_id))
            .all(&self.conn)
            .await?)
    }

    pub async fn get_tv_show_cast(&self, tv_id: i64) -> Result<Vec<tv_show_cast::Model>> {
        Ok(TvShowCast::find()
            .filter(tv_show_cast::Column::TvId.eq(tv_id))
            .all(&self.conn)
            .await?)
    }
}

/// Keeps one item per key: the value of the last occurrence, at the position
/// of the first.
fn dedup_last<'a, T, K, I, F>(items: I, key: F) -> Vec<&'a T>
where
    I: Iterator<Item = &'a T>,
    K: Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<&T> = Vec::new();
    for item in items {
        match positions.get(&key(item)) {
            Some(&idx) => out[idx] = item,
            None => {
                positions.insert(key(item), out.len());
                out.push(item);
            }
        }
    }
    out
}

async fn prune_movie_cast(
    txn: &DatabaseTransaction,
    ids: &[i64],
    fresh: &[&MovieCastRow],
) -> Result<usize> {
    let keep: HashSet<(i64, i64, &str)> = fresh
        .iter()
        .map(|c| (c.movie_id, c.person_id, c.character.as_str()))
        .collect();
    let existing = MovieCast::find()
        .filter(movie_cast::Column::MovieId.is_in(ids.iter().copied()))
        .all(txn)
        .await?;

    let mut pruned = 0;
    for row in existing {
        if !keep.contains(&(row.movie_id, row.person_id, row.character.as_str())) {
            MovieCast::delete_by_id((row.movie_id, row.person_id, row.character))
                .exec(txn)
                .await?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

async fn prune_movie_crew(
    txn: &DatabaseTransaction,
    ids: &[i64],
    fresh: &[&MovieCrewRow],
) -> Result<usize> {
    let keep: HashSet<(i64, i64, &str)> = fresh
        .iter()
        .map(|c| (c.movie_id, c.person_id, c.job.as_str()))
        .collect();
    let existing = MovieCrew::find()
        .filter(movie_crew::Column::MovieId.is_in(ids.iter().copied()))
        .all(txn)
        .await?;

    let mut pruned = 0;
    for row in existing {
        if !keep.contains(&(row.movie_id, row.person_id, row.job.as_str())) {
            MovieCrew::delete_by_id((row.movie_id, row.person_id, row.job))
                .exec(txn)
                .await?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

async fn prune_tv_cast(
    txn: &DatabaseTransaction,
    ids: &[i64],
    fresh: &[&TvCastRow],
) -> Result<usize> {
    let keep: HashSet<(i64, i64, &str)> = fresh
        .iter()
        .map(|c| (c.tv_id, c.person_id, c.character.as_str()))
        .collect();
    let existing = TvShowCast::find()
        .filter(tv_show_cast::Column::TvId.is_in(ids.iter().copied()))
        .all(txn)
        .await?;

    let mut pruned = 0;
    for row in existing {
        if !keep.contains(&(row.tv_id, row.person_id, row.character.as_str())) {
            TvShowCast::delete_by_id((row.tv_id, row.person_id, row.character))
                .exec(txn)
                .await?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

async fn prune_tv_crew(
    txn: &DatabaseTransaction,
    ids: &[i64],
    fresh: &[&TvCrewRow],
) -> Result<usize> {
    let keep: HashSet<(i64, i64, &str)> = fresh
        .iter()
        .map(|c| (c.tv_id, c.person_id, c.job.as_str()))
        .collect();
    let existing = TvShowCrew::find()
        .filter(tv_show_crew::Column::TvId.is_in(ids.iter().copied()))
        .all(txn)
        .await?;

    let mut pruned = 0;
    for row in existing {
        if !keep.contains(&(row.tv_id, row.person_id, row.job.as_str())) {
            TvShowCrew::delete_by_id((row.tv_id, row.person_id, row.job))
                .exec(txn)
                .await?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

fn movie_model(row: &MovieRow, now: &str) -> movies::ActiveModel {
    movies::ActiveModel {
        id: Set(row.id),
        title: Set(row.title.clone()),
        original_title: Set(row.original_title.clone()),
        original_language: Set(row.original_language.clone()),
        overview: Set(row.overview.clone()),
        release_date: Set(row.release_date.clone()),
        runtime: Set(row.runtime),
        status: Set(row.status.clone()),
        tagline: Set(row.tagline.clone()),
        popularity: Set(row.popularity),
        vote_average: Set(row.vote_average),
        vote_count: Set(row.vote_count),
        budget: Set(row.budget),
        revenue: Set(row.revenue),
        adult: Set(row.adult),
        imdb_id: Set(row.imdb_id.clone()),
        homepage: Set(row.homepage.clone()),
        poster_path: Set(row.poster_path.clone()),
        backdrop_path: Set(row.backdrop_path.clone()),
        genres: Set(row.genres.clone()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    }
}

fn movie_cast_model(row: &MovieCastRow, now: &str) -> movie_cast::ActiveModel {
    movie_cast::ActiveModel {
        movie_id: Set(row.movie_id),
        person_id: Set(row.person_id),
        character: Set(row.character.clone()),
        name: Set(row.name.clone()),
        credit_id: Set(row.credit_id.clone()),
        cast_order: Set(row.cast_order),
        gender: Set(row.gender),
        profile_path: Set(row.profile_path.clone()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    }
}

fn movie_crew_model(row: &MovieCrewRow, now: &str) -> movie_crew::ActiveModel {
    movie_crew::ActiveModel {
        movie_id: Set(row.movie_id),
        person_id: Set(row.person_id),
        job: Set(row.job.clone()),
        name: Set(row.name.clone()),
        department: Set(row.department.clone()),
        credit_id: Set(row.credit_id.clone()),
        gender: Set(row.gender),
        profile_path: Set(row.profile_path.clone()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    }
}

fn tv_show_model(row: &TvShowRow, now: &str) -> tv_shows::ActiveModel {
    tv_shows::ActiveModel {
        id: Set(row.id),
        name: Set(row.name.clone()),
        original_name: Set(row.original_name.clone()),
        original_language: Set(row.original_language.clone()),
        overview: Set(row.overview.clone()),
        first_air_date: Set(row.first_air_date.clone()),
        last_air_date: Set(row.last_air_date.clone()),
        number_of_seasons: Set(row.number_of_seasons),
        number_of_episodes: Set(row.number_of_episodes),
        status: Set(row.status.clone()),
        show_type: Set(row.show_type.clone()),
        in_production: Set(row.in_production),
        popularity: Set(row.popularity),
        vote_average: Set(row.vote_average),
        vote_count: Set(row.vote_count),
        poster_path: Set(row.poster_path.clone()),
        backdrop_path: Set(row.backdrop_path.clone()),
        genres: Set(row.genres.clone()),
        networks: Set(row.networks.clone()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    }
}

fn tv_cast_model(row: &TvCastRow, now: &str) -> tv_show_cast::ActiveModel {
    tv_show_cast::ActiveModel {
        tv_id: Set(row.tv_id),
        person_id: Set(row.person_id),
        character: Set(row.character.clone()),
        name: Set(row.name.clone()),
        credit_id: Set(row.credit_id.clone()),
        episode_count: Set(row.episode_count),
        total_episode_count: Set(row.total_episode_count),
        gender: Set(row.gender),
        popularity: Set(row.popularity),
        profile_path: Set(row.profile_path.clone()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    }
}

fn tv_crew_model(row: &TvCrewRow, now: &str) -> tv_show_crew::ActiveModel {
    tv_show_crew::ActiveModel {
        tv_id: Set(row.tv_id),
        person_id: Set(row.person_id),
        job: Set(row.job.clone()),
        name: Set(row.name.clone()),
        department: Set(row.department.clone()),
        credit_id: Set(row.credit_id.clone()),
        episode_count: Set(row.episode_count),
        total_episode_count: Set(row.total_episode_count),
        gender: Set(row.gender),
        profile_path: Set(row.profile_path.clone()),
        created_at: Set(now.to_string()),
        updated_at: Set(now.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_last_keeps_first_position_last_value() {
        let rows = [(1, "a"), (2, "b"), (1, "c")];
        let out = dedup_last(rows.iter(), |r| r.0);
        assert_eq!(out, vec![&(1, "c"), &(2, "b")]);
    }
}
