use bolo_core::prelude::*;
use log::debug;
use once_cell::sync::Lazy;

/// Ticks a shell stays in flight before it bursts.
pub const SHELL_LIFESPAN: u8 = 8;
/// Ticks an explosion lingers.
pub const EXPLOSION_LIFESPAN: u8 = 5;

/// A shell in flight. Bursts into an [`Explosion`] when its lifespan runs out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shell {
    base: EntityBase,
    pub direction: u8,
    pub lifespan: u8,
    pub owner: Reference,
    pub on_water: bool,
}

static SHELL_SCHEMA: Lazy<Schema<Shell>> = Lazy::new(|| {
    Schema::<Shell>::builder()
        .scalar("direction", Scalar::U8, |s| s.direction as i64, |s, v| s.direction = v as u8)
        .reference("owner", |s| &s.owner, |s| &mut s.owner)
        .scalar("lifespan", Scalar::U8, |s| s.lifespan as i64, |s, v| s.lifespan = v as u8)
        .flag("on_water", |s| s.on_water, |s, v| s.on_water = v)
        .build()
});

impl Shell {
    pub fn new(x: i32, y: i32, direction: u8, owner: Reference) -> Self {
        Shell {
            base: EntityBase::at(x, y),
            direction,
            lifespan: SHELL_LIFESPAN,
            owner,
            on_water: false,
        }
    }
}

impl Entity for Shell {
    entity_plumbing!();

    fn update(&mut self, ctx: &mut Context<'_>) {
        if !ctx.is_live() {
            return;
        }
        self.lifespan = self.lifespan.saturating_sub(1);
        if self.lifespan == 0 {
            debug!("{:?} bursts at ({}, {})", ctx.this(), self.base.x, self.base.y);
            ctx.spawn(Explosion::new(self.base.x, self.base.y));
            ctx.destroy_self();
        }
    }
}

impl Variant for Shell {
    const TAG: TypeTag = TypeTag::new(b'S');
    const NAME: &'static str = "shell";

    fn blank() -> Self {
        Shell::default()
    }

    fn field_schema() -> &'static Schema<Self> {
        &SHELL_SCHEMA
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Explosion {
    base: EntityBase,
    pub lifespan: u8,
}

static EXPLOSION_SCHEMA: Lazy<Schema<Explosion>> = Lazy::new(|| {
    Schema::<Explosion>::builder()
        .scalar("lifespan", Scalar::U8, |e| e.lifespan as i64, |e, v| e.lifespan = v as u8)
        .build()
});

impl Explosion {
    pub fn new(x: i32, y: i32) -> Self {
        Explosion {
            base: EntityBase::at(x, y),
            lifespan: EXPLOSION_LIFESPAN,
        }
    }
}

impl Entity for Explosion {
    entity_plumbing!();

    fn update(&mut self, ctx: &mut Context<'_>) {
        if !ctx.is_live() {
            return;
        }
        self.lifespan = self.lifespan.saturating_sub(1);
        if self.lifespan == 0 {
            ctx.destroy_self();
        }
    }
}

impl Variant for Explosion {
    const TAG: TypeTag = TypeTag::new(b'X');
    const NAME: &'static str = "explosion";

    fn blank() -> Self {
        Explosion::default()
    }

    fn field_schema() -> &'static Schema<Self> {
        &EXPLOSION_SCHEMA
    }
}
