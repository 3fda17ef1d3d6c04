//! Authority-to-mirror replication over whole ticks.

use bolo_core::{EntityRef, ObjectTable, Reference};
use bolo_simulation::{builtin_registry, Base, Pillbox, Shell, Tank};
use bolo_transport::{packet, Outbox, ReceiveError, Receiver, TableSummary};

struct Link {
    authority: ObjectTable,
    outbox: Outbox,
    mirror: ObjectTable,
    receiver: Receiver,
}

impl Link {
    fn new() -> Self {
        let outbox = Outbox::new();
        let mut authority = ObjectTable::new();
        authority.set_bridge(Box::new(outbox.clone()));
        Link {
            authority,
            outbox,
            mirror: ObjectTable::new(),
            receiver: Receiver::new(builtin_registry().unwrap()),
        }
    }

    fn sync(&mut self) {
        let packet = self.outbox.flush_tick(&self.authority).unwrap();
        self.receiver.apply(&mut self.mirror, &packet).unwrap();
    }

    fn assert_converged(&self) {
        let authority = TableSummary::capture(&self.authority).unwrap();
        let mirror = TableSummary::capture(&self.mirror).unwrap();
        assert!(authority.same_world(&mirror), "authority {:#?}\nmirror {:#?}", authority, mirror);
    }

    fn join(&mut self, tank: Tank) -> EntityRef {
        let tank = self.authority.spawn(tank);
        self.authority.add_player(&tank).unwrap();
        tank
    }
}

#[test]
fn mirror_converges_over_many_ticks() {
    let mut link = Link::new();
    let mut gunner = Tank::new(10, 10, 64);
    gunner.firing = true;
    let gunner = link.join(gunner);
    let other = link.join(Tank::new(40, 40, 0));

    let mut pillbox = Pillbox::new(20, 20, Reference::to(&gunner));
    pillbox.have_target = true;
    link.authority.spawn(pillbox);
    link.authority.spawn(Base::new(30, 30, Reference::to(&other)));
    link.sync();
    link.assert_converged();

    for tick in 0..60 {
        link.authority.tick();
        if tick == 25 {
            link.authority.destroy(&gunner).unwrap();
        }
        link.sync();
        link.assert_converged();
    }

    // The surviving player moved into slot 0 on both sides.
    assert_eq!(link.mirror.players().len(), 1);
    assert_eq!(link.mirror.player(0).unwrap().index(), other.index());
}

#[test]
fn references_rebind_on_the_mirror() {
    let mut link = Link::new();
    let first = link.join(Tank::new(0, 0, 0));
    let second = link.join(Tank::new(1, 1, 0));
    link.authority.spawn(Shell::new(5, 5, 0, Reference::to(&second)));
    link.sync();

    let mirrored_shell = link.mirror.get(2).unwrap().clone();
    let mirrored_second = link.mirror.get(1).unwrap().clone();
    assert!(mirrored_shell
        .downcast::<Shell>()
        .unwrap()
        .owner
        .get()
        .unwrap()
        .ptr_eq(&mirrored_second));

    link.authority.remove_player(&first).unwrap();
    link.sync();
    assert_eq!(mirrored_second.tank_index(), Some(0));
    assert!(mirrored_shell
        .downcast::<Shell>()
        .unwrap()
        .owner
        .get()
        .unwrap()
        .ptr_eq(&mirrored_second));
    link.assert_converged();
}

#[test]
fn bad_message_keeps_earlier_ones() {
    let mut link = Link::new();
    link.join(Tank::new(3, 3, 0));
    let mut bytes = link.outbox.take();
    bytes.extend([packet::DESTROY, 0]);

    let err = link.receiver.apply(&mut link.mirror, &bytes).unwrap_err();
    assert!(matches!(err, ReceiveError::Truncated { .. }));
    assert_eq!(link.mirror.len(), 1);
    assert_eq!(link.mirror.players().len(), 1);
}

#[test]
fn truncated_update_leaves_unreached_entities_alone() {
    let mut link = Link::new();
    link.join(Tank::new(3, 3, 0));
    link.sync();

    let tank = link.authority.get(0).unwrap().clone();
    tank.downcast_mut::<Tank>().unwrap().shells = 7;
    let mut packet = link.outbox.flush_tick(&link.authority).unwrap();
    packet.pop();

    let err = link.receiver.apply(&mut link.mirror, &packet).unwrap_err();
    assert!(matches!(err, ReceiveError::Schema(_)));
    let mirrored = link.mirror.get(0).unwrap().downcast::<Tank>().unwrap().shells;
    assert_eq!(mirrored, bolo_simulation::tank::MAX_SHELLS);
}
