use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_movie_cast_person")
                    .table(MovieCast::Table)
                    .col(MovieCast::PersonId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_movie_crew_person")
                    .table(MovieCrew::Table)
                    .col(MovieCrew::PersonId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tv_show_cast_person")
                    .table(TvShowCast::Table)
                    .col(TvShowCast::PersonId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_tv_show_crew_person")
                    .table(TvShowCrew::Table)
                    .col(TvShowCrew::PersonId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_movie_cast_person",
            "idx_movie_crew_person",
            "idx_tv_show_cast_person",
            "idx_tv_show_crew_person",
        ] {
            manager
                .drop_index(Index::drop().if_exists().name(name).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum MovieCast {
    Table,
    PersonId,
}

#[derive(DeriveIden)]
enum MovieCrew {
    Table,
    PersonId,
}

#[derive(DeriveIden)]
enum TvShowCast {
    Table,
    PersonId,
}

#[derive(DeriveIden)]
enum TvShowCrew {
    Table,
    PersonId,
}
