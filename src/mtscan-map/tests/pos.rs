use mtscan_map::{MapBlockPos, NodePos};

#[test]
fn block_id_round_trips_for_known_ids() {
    let ids = [
        0,
        1,
        -1,
        16,
        -16,
        17,
        -17,
        1024,
        -1024,
        4095,
        -4095,
        MapBlockPos::new(2047, 2047, 2047).id(),
        MapBlockPos::new(-2047, -2047, -2047).id(),
        MapBlockPos::new(2047, -2047, 2047).id(),
        MapBlockPos::new(-2048, -2048, -2048).id(),
    ];

    for id in ids {
        assert_eq!(MapBlockPos::from_id(id).id(), id, "id {id}");
    }
}

#[test]
fn block_pos_round_trips_across_the_range() {
    for x in (-2048..=2047).step_by(129) {
        for y in (-2048..=2047).step_by(257) {
            for z in (-2048..=2047).step_by(311) {
                let pos = MapBlockPos::new(x, y, z);
                assert_eq!(MapBlockPos::from_id(pos.id()), pos);
            }
        }
    }

    assert_eq!(MapBlockPos::from_id(MapBlockPos::MAX.id()), MapBlockPos::MAX);
    assert_eq!(MapBlockPos::from_id(MapBlockPos::MIN.id()), MapBlockPos::MIN);
}

#[test]
fn packed_ids_separate_axes() {
    assert_eq!(MapBlockPos::new(1, 0, 0).id(), 1);
    assert_eq!(MapBlockPos::new(0, 1, 0).id(), 0x1000);
    assert_eq!(MapBlockPos::new(0, 0, 1).id(), 0x100_0000);
    assert_eq!(MapBlockPos::new(-1, 0, 0).id(), -1);
}

#[test]
fn node_pos_matches_block_and_index() {
    let block = MapBlockPos::new(3, -2, 11);

    for index in [0u16, 1, 42, 255, 4095] {
        let node = NodePos::new(block, index);
        assert_eq!(node.block(), block);
        assert_eq!(node.block_id(), block.id());

        // The low nibble of each component is the in-block offset.
        assert_eq!((node.x & 0xf) as u16, index & 0xf);
        assert_eq!((node.y & 0xf) as u16, (index >> 4) & 0xf);
        assert_eq!((node.z & 0xf) as u16, (index >> 8) & 0xf);
    }
}

#[test]
fn node_pos_packing_is_distinct_per_node() {
    let block = MapBlockPos::new(0, 0, 0);
    assert_eq!(NodePos::new(block, 0).id(), 0);
    assert_eq!(NodePos::new(block, 1).id(), 1);
    assert_eq!(NodePos::new(block, 16).id(), 0x1_0000);
    assert_eq!(NodePos::new(block, 256).id(), 0x1_0000_0000);

    let neg = NodePos::new(MapBlockPos::new(-1, 0, 0), 15);
    assert_eq!(neg.x, -1);
    assert_eq!(neg.id(), -1);
}

#[test]
fn inside_is_half_open() {
    let min = MapBlockPos::new(0, 0, 0);
    let max = MapBlockPos::new(2, 2, 2);

    assert!(MapBlockPos::new(0, 0, 0).inside(min, max));
    assert!(MapBlockPos::new(1, 1, 1).inside(min, max));
    assert!(!MapBlockPos::new(2, 1, 1).inside(min, max));
    assert!(!MapBlockPos::new(1, 2, 1).inside(min, max));
    assert!(!MapBlockPos::new(1, 1, 2).inside(min, max));
    assert!(!MapBlockPos::new(-1, 0, 0).inside(min, max));
}

#[test]
fn sort_orders_each_axis_independently() {
    let mut a = MapBlockPos::new(5, -3, 7);
    let mut b = MapBlockPos::new(-5, 3, 9);
    a.sort(&mut b);

    assert_eq!(a, MapBlockPos::new(-5, -3, 7));
    assert_eq!(b, MapBlockPos::new(5, 3, 9));
}

#[test]
fn parse_from_str() {
    assert_eq!("1,2,3".parse::<MapBlockPos>().unwrap(), MapBlockPos::new(1, 2, 3));
    assert_eq!("-5, 6, -7".parse::<MapBlockPos>().unwrap(), MapBlockPos::new(-5, 6, -7));

    assert!("".parse::<MapBlockPos>().is_err());
    assert!("1,2".parse::<MapBlockPos>().is_err());
    assert!("1,2,3,4".parse::<MapBlockPos>().is_err());
    assert!("a,b,c".parse::<MapBlockPos>().is_err());
}
