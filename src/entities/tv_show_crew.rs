use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tv_show_crew")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tv_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub person_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub job: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub credit_id: Option<String>,
    pub episode_count: Option<i32>,
    pub total_episode_count: Option<i32>,
    pub gender: Option<i32>,
    pub profile_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tv_shows::Entity",
        from = "Column::TvId",
        to = "super::tv_shows::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    TvShows,
}

impl Related<super::tv_shows::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TvShows.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
