//! Map-bound structures that players capture: pillboxes and refuelling bases.
//!
//! Both are drawn as styled tiles whose look depends on ownership, so they
//! ask for a redraw whenever a remote update lands.

use bolo_core::prelude::*;
use log::debug;
use once_cell::sync::Lazy;

use crate::munitions::Shell;

pub const PILLBOX_MAX_ARMOUR: u8 = 15;
/// Slowest rate of fire, in ticks between shots, of a calm pillbox.
pub const PILLBOX_MAX_SPEED: u8 = 50;
/// Ticks a provoked pillbox stays fast before calming down.
pub const PILLBOX_COOLDOWN: u8 = 32;

pub const BASE_MAX_ARMOUR: u8 = 90;
pub const BASE_MAX_SHELLS: u8 = 90;
pub const BASE_MAX_MINES: u8 = 90;
/// Ticks between two refuel steps of a base.
pub const BASE_REFUEL_INTERVAL: u8 = 20;

/// Tile sheet row of the pillbox tiles; the column is the armour level.
const PILLBOX_TILE_ROW: u16 = 2;
const BASE_TILE: (u16, u16) = (9, 0);
const OWNED_BASE_TILE: (u16, u16) = (9, 1);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pillbox {
    base: EntityBase,
    pub owner: Reference,
    pub armour: u8,
    pub speed: u8,
    pub cooldown: u8,
    pub reload: u8,
    pub in_tank: bool,
    pub carried: bool,
    pub have_target: bool,
}

static PILLBOX_SCHEMA: Lazy<Schema<Pillbox>> = Lazy::new(|| {
    Schema::<Pillbox>::builder()
        .reference("owner", |p| &p.owner, |p| &mut p.owner)
        .scalar("armour", Scalar::U8, |p| p.armour as i64, |p, v| p.armour = v as u8)
        .flag("in_tank", |p| p.in_tank, |p, v| p.in_tank = v)
        .flag("carried", |p| p.carried, |p, v| p.carried = v)
        .scalar("speed", Scalar::U8, |p| p.speed as i64, |p, v| p.speed = v as u8)
        .scalar("cooldown", Scalar::U8, |p| p.cooldown as i64, |p, v| p.cooldown = v as u8)
        .scalar("reload", Scalar::U8, |p| p.reload as i64, |p, v| p.reload = v as u8)
        .flag("have_target", |p| p.have_target, |p, v| p.have_target = v)
        .build()
});

impl Pillbox {
    pub fn new(x: i32, y: i32, owner: Reference) -> Self {
        Pillbox {
            base: EntityBase::at(x, y),
            owner,
            armour: PILLBOX_MAX_ARMOUR,
            speed: PILLBOX_MAX_SPEED,
            cooldown: 0,
            reload: 0,
            in_tank: false,
            carried: false,
            have_target: false,
        }
    }

    /// Marks the pillbox as under attack: it fires twice as fast for a while.
    pub fn provoke(&mut self) {
        self.speed = (self.speed / 2).max(6);
        self.cooldown = PILLBOX_COOLDOWN;
    }

    fn on_map(&self) -> bool {
        self.base.is_placed() && !self.in_tank && !self.carried
    }
}

impl Entity for Pillbox {
    entity_plumbing!();

    fn draw_kind(&self) -> DrawKind {
        DrawKind::StyledTile
    }

    fn tile(&self) -> Option<(u16, u16)> {
        self.on_map()
            .then(|| (self.armour.min(PILLBOX_MAX_ARMOUR) as u16, PILLBOX_TILE_ROW))
    }

    fn update(&mut self, ctx: &mut Context<'_>) {
        if !ctx.is_live() || !self.on_map() || self.armour == 0 {
            return;
        }
        if self.cooldown > 0 {
            self.cooldown -= 1;
            if self.cooldown == 0 {
                self.speed = PILLBOX_MAX_SPEED;
            }
        }
        self.reload = self.reload.saturating_sub(1);
        if self.have_target && self.reload == 0 {
            self.reload = self.speed;
            let shell = ctx.spawn(Shell::new(self.base.x, self.base.y, 0, self.owner.clone()));
            debug!("{:?} fired {:?}", ctx.this(), shell);
        }
    }

    fn post_net_update(&mut self, ctx: &mut Context<'_>) {
        if self.base.is_placed() {
            ctx.invalidate(self.base.x, self.base.y);
        }
    }
}

impl Variant for Pillbox {
    const TAG: TypeTag = TypeTag::new(b'p');
    const NAME: &'static str = "pillbox";

    fn blank() -> Self {
        Pillbox::default()
    }

    fn field_schema() -> &'static Schema<Self> {
        &PILLBOX_SCHEMA
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Base {
    base: EntityBase,
    pub owner: Reference,
    pub armour: u8,
    pub shells: u8,
    pub mines: u8,
    refuel_timer: u8,
}

static BASE_SCHEMA: Lazy<Schema<Base>> = Lazy::new(|| {
    Schema::<Base>::builder()
        .reference("owner", |b| &b.owner, |b| &mut b.owner)
        .scalar("armour", Scalar::U8, |b| b.armour as i64, |b, v| b.armour = v as u8)
        .scalar("shells", Scalar::U8, |b| b.shells as i64, |b, v| b.shells = v as u8)
        .scalar("mines", Scalar::U8, |b| b.mines as i64, |b, v| b.mines = v as u8)
        .build()
});

impl Base {
    pub fn new(x: i32, y: i32, owner: Reference) -> Self {
        Base {
            base: EntityBase::at(x, y),
            owner,
            armour: BASE_MAX_ARMOUR,
            shells: BASE_MAX_SHELLS,
            mines: BASE_MAX_MINES,
            refuel_timer: 0,
        }
    }
}

impl Entity for Base {
    entity_plumbing!();

    fn draw_kind(&self) -> DrawKind {
        DrawKind::StyledTile
    }

    fn tile(&self) -> Option<(u16, u16)> {
        if self.owner.is_some() {
            Some(OWNED_BASE_TILE)
        } else {
            Some(BASE_TILE)
        }
    }

    fn update(&mut self, ctx: &mut Context<'_>) {
        if !ctx.is_live() {
            return;
        }
        self.refuel_timer = self.refuel_timer.saturating_add(1);
        if self.refuel_timer < BASE_REFUEL_INTERVAL {
            return;
        }
        self.refuel_timer = 0;
        self.armour = self.armour.saturating_add(1).min(BASE_MAX_ARMOUR);
        self.shells = self.shells.saturating_add(1).min(BASE_MAX_SHELLS);
        self.mines = self.mines.saturating_add(1).min(BASE_MAX_MINES);
    }

    fn post_net_update(&mut self, ctx: &mut Context<'_>) {
        ctx.invalidate(self.base.x, self.base.y);
    }
}

impl Variant for Base {
    const TAG: TypeTag = TypeTag::new(b'b');
    const NAME: &'static str = "base";

    fn blank() -> Self {
        Base::default()
    }

    fn field_schema() -> &'static Schema<Self> {
        &BASE_SCHEMA
    }
}
