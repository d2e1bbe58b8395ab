use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tv_shows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
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
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tv_show_cast::Entity")]
    TvShowCast,
    #[sea_orm(has_many = "super::tv_show_crew::Entity")]
    TvShowCrew,
}

impl Related<super::tv_show_cast::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TvShowCast.def()
    }
}

impl Related<super::tv_show_crew::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TvShowCrew.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
