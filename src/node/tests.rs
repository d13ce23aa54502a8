//! Tests for the node tree

use super::*;
use crate::error::{ErrorKind, TreeError};

fn kind_of(err: eyre::Report) -> ErrorKind {
    err.downcast_ref::<TreeError>().expect("typed payload").kind()
}

#[test]
fn fresh_node_is_empty() {
    let n = Node::new();
    assert!(n.is_empty());
    assert_eq!(n.tag(), TypeTag::Empty);
    assert_eq!(n.total_bytes(), 0);
    assert_eq!(n.number_of_children(), 0);
}

#[test]
fn scalar_set_and_read() {
    let mut n = Node::new();
    n.set_float64(3.14);
    assert_eq!(n.tag(), TypeTag::Float64);
    assert_eq!(n.total_bytes(), 8);
    assert_eq!(n.as_float64().unwrap().get(0), 3.14);
    assert_eq!(n.to_float64().unwrap(), 3.14);

    let bytes = n.serialize();
    assert_eq!(bytes.len(), 8);
    assert_eq!(bytes, 3.14f64.to_ne_bytes());
}

#[test]
fn scalar_rewrite_reuses_storage() {
    let mut n = Node::new();
    n.set_int32(1);
    let before = n.as_int32_ptr().unwrap();
    n.set_int32(2);
    let after = n.as_int32_ptr().unwrap();
    assert_eq!(before, after);
    assert_eq!(n.to_int32().unwrap(), 2);
}

#[test]
fn changing_leaf_shape_reallocates() {
    let mut n = Node::new();
    n.set_int32(1);
    n.set_int64_slice(&[1, 2, 3]);
    assert_eq!(n.tag(), TypeTag::Int64);
    assert_eq!(n.total_bytes(), 24);
    assert_eq!(n.as_int64().unwrap().to_vec(), vec![1, 2, 3]);
}

#[test]
fn object_construction_via_path() {
    let mut n = Node::new();
    n.fetch("a/b/c").unwrap().set_int32(7);

    assert!(n.is_object());
    assert!(n.has_path("a/b/c"));
    assert!(!n.has_path("a/b/missing"));
    assert_eq!(n.get("a").get("b").get("c").to_int32().unwrap(), 7);
    assert_eq!(n.paths(true), vec!["a/b/c".to_string()]);
}

#[test]
fn missing_path_lookups_chain_through_the_sentinel() {
    let n = Node::new();
    let miss = n.get("no/such/path").get("x").get("y");
    assert!(miss.is_empty());
    assert!(std::ptr::eq(miss, Node::empty_ref()));
}

#[test]
fn get_index_out_of_range_is_the_sentinel() {
    let mut n = Node::new();
    n.append().unwrap().set_int8(1);
    assert!(n.get_index(5).is_empty());
    assert_eq!(n.get_index(0).to_int8().unwrap(), 1);
}

#[test]
fn fetch_through_a_leaf_is_a_path_error() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(1);
    assert_eq!(kind_of(n.fetch("a/b").unwrap_err()), ErrorKind::Path);
}

#[test]
fn fetch_promotes_empty_to_object() {
    let mut n = Node::new();
    n.fetch("x").unwrap();
    assert!(n.is_object());
    assert!(n.get("x").is_empty());
}

#[test]
fn append_builds_lists_and_rejects_leaves() {
    let mut n = Node::new();
    n.append().unwrap().set_int32(1);
    n.append().unwrap().set_int32(2);
    assert!(n.is_list());
    assert_eq!(n.number_of_children(), 2);

    let mut leaf = Node::new();
    leaf.set_int8(0);
    assert_eq!(kind_of(leaf.append().unwrap_err()), ErrorKind::TypeMismatch);
}

#[test]
fn remove_shifts_sibling_indices() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32(1);
    n.fetch("b").unwrap().set_int32(2);
    n.fetch("c").unwrap().set_int32(3);

    let removed = n.remove("b").unwrap();
    assert_eq!(removed.to_int32().unwrap(), 2);
    assert_eq!(n.child_names(), ["a", "c"]);
    assert_eq!(n.get("c").to_int32().unwrap(), 3);
    assert_eq!(kind_of(n.remove("b").unwrap_err()), ErrorKind::Path);
}

#[test]
fn remove_index_on_lists() {
    let mut n = Node::new();
    for v in [10i32, 20, 30] {
        n.append().unwrap().set_int32(v);
    }
    n.remove_index(0).unwrap();
    assert_eq!(n.get_index(0).to_int32().unwrap(), 20);
    assert_eq!(n.get_index(1).to_int32().unwrap(), 30);
    assert!(n.remove_index(5).is_err());
}

#[test]
fn update_merges_objects_recursively() {
    let mut a = Node::new();
    a.fetch("x").unwrap().set_int32(1);
    a.fetch("y/p").unwrap().set_int32(2);

    let mut b = Node::new();
    b.fetch("y/q").unwrap().set_int32(3);
    b.fetch("z").unwrap().set_int32(4);

    a.update(&b).unwrap();
    assert_eq!(a.get("x").to_int32().unwrap(), 1);
    assert_eq!(a.get("y/p").to_int32().unwrap(), 2);
    assert_eq!(a.get("y/q").to_int32().unwrap(), 3);
    assert_eq!(a.get("z").to_int32().unwrap(), 4);
}

#[test]
fn update_replaces_leaves_wholesale() {
    let mut a = Node::new();
    a.fetch("v").unwrap().set_int32_slice(&[1, 2, 3]);
    let mut b = Node::new();
    b.fetch("v").unwrap().set_float64(9.0);
    a.update(&b).unwrap();
    assert_eq!(a.get("v").tag(), TypeTag::Float64);
    assert_eq!(a.get("v").to_float64().unwrap(), 9.0);
}

#[test]
fn external_strided_view_reads_every_other_element() {
    let mut backing: Vec<u32> = (0..8).collect();
    let dtype = DataType::new(TypeTag::UInt32, 4, 0, 8, 4, Endianness::Default).unwrap();

    let mut n = Node::new();
    // SAFETY: backing outlives n within this test and nothing else touches it.
    unsafe {
        n.set_external(backing.as_mut_ptr() as *mut u8, backing.len() * 4, dtype)
            .unwrap();
    }

    assert!(n.is_data_external());
    assert_eq!(n.as_uint32().unwrap().to_vec(), vec![0, 2, 4, 6]);
    assert_eq!(n.total_bytes_compact(), 16);

    let mut compact = Node::new();
    n.compact_to(&mut compact);
    assert!(compact.is_compact());
    assert!(!compact.is_data_external());
    assert_eq!(compact.serialize().len(), 16);
    assert_eq!(compact.as_uint32().unwrap().to_vec(), vec![0, 2, 4, 6]);
}

#[test]
fn external_mutation_is_observable_both_ways() {
    let mut backing = [0u8; 8];
    let dtype = DataType::array(TypeTag::UInt32, 2);

    let mut n = Node::new();
    // SAFETY: backing outlives n within this test and nothing else touches
    // it while the node is live.
    unsafe {
        n.set_external(backing.as_mut_ptr(), backing.len(), dtype).unwrap();
    }

    n.as_uint32_mut().unwrap().set(0, 0xAABBCCDD);
    n.as_uint32_mut().unwrap().set(1, 0x11223344);

    // Writes through the node land in the caller's buffer...
    let seen = [
        u32::from_ne_bytes(backing[0..4].try_into().unwrap()),
        u32::from_ne_bytes(backing[4..8].try_into().unwrap()),
    ];
    assert_eq!(seen, [0xAABBCCDD, 0x11223344]);

    // ...and a compatible set writes in place rather than detaching.
    n.set_uint32_slice(&[1, 2]);
    assert!(n.is_data_external());
    assert_eq!(u32::from_ne_bytes(backing[0..4].try_into().unwrap()), 1);
}

#[test]
fn incompatible_set_detaches_from_external_memory() {
    let mut backing = [0u8; 4];
    let mut n = Node::new();
    // SAFETY: backing outlives n within this test.
    unsafe {
        n.set_external(backing.as_mut_ptr(), 4, DataType::scalar(TypeTag::UInt32))
            .unwrap();
    }
    n.set_float64(2.5);
    assert!(!n.is_data_external());
    assert_eq!(n.to_float64().unwrap(), 2.5);
    assert_eq!(backing, [0u8; 4]);
}

#[test]
fn set_external_validates_pointer_and_span() {
    let mut n = Node::new();
    let err = unsafe {
        n.set_external(std::ptr::null_mut(), 8, DataType::scalar(TypeTag::UInt64))
            .unwrap_err()
    };
    assert_eq!(kind_of(err), ErrorKind::InvalidArgument);

    let mut small = [0u8; 4];
    let err = unsafe {
        n.set_external(small.as_mut_ptr(), 4, DataType::scalar(TypeTag::UInt64))
            .unwrap_err()
    };
    assert_eq!(kind_of(err), ErrorKind::InvalidArgument);
}

#[test]
fn set_schema_allocates_a_bound_tree() {
    let mut schema = Schema::Empty;
    *schema.fetch("a").unwrap() = Schema::leaf(DataType::scalar(TypeTag::Int32));
    *schema.fetch("b").unwrap() =
        Schema::leaf(DataType::array(TypeTag::Float64, 2).with_offset(4));

    let mut n = Node::new();
    n.set_schema(&schema);
    assert!(n.is_object());
    assert_eq!(n.total_bytes_compact(), 4 + 16);

    n.fetch("a").unwrap().set_int32(5);
    n.fetch("b").unwrap().as_float64_mut().unwrap().set(1, 7.5);
    assert_eq!(n.get("a").to_int32().unwrap(), 5);
    assert_eq!(n.get("b").as_float64().unwrap().get(1), 7.5);
}

#[test]
fn set_dtype_carries_no_storage() {
    let mut n = Node::new();
    n.set_int32(7);
    n.set_dtype(DataType::array(TypeTag::Float32, 4));
    assert_eq!(n.tag(), TypeTag::Float32);
    assert!(n.as_float32().is_err());
}

#[test]
fn reset_returns_any_node_to_empty() {
    let mut n = Node::new();
    n.fetch("a/b").unwrap().set_int64_slice(&[1, 2]);
    n.reset();
    assert!(n.is_empty());
    assert_eq!(n.total_bytes(), 0);
    assert_eq!(n.number_of_children(), 0);
}

#[test]
fn compact_collapses_strides_and_is_idempotent() {
    let mut backing: Vec<u16> = (0..6).collect();
    let dtype = DataType::new(TypeTag::UInt16, 3, 0, 4, 2, Endianness::Default).unwrap();
    let mut n = Node::new();
    // SAFETY: backing outlives n within this test.
    unsafe {
        n.set_external(backing.as_mut_ptr() as *mut u8, 12, dtype).unwrap();
    }
    assert!(!n.is_compact());

    n.compact();
    assert!(n.is_compact());
    assert_eq!(n.as_uint16().unwrap().to_vec(), vec![0, 2, 4]);

    let once = n.serialize();
    n.compact();
    assert_eq!(n.serialize(), once);
}

#[test]
fn serialize_concatenates_leaves_in_schema_order() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_uint8_slice(&[1, 2]);
    n.fetch("b").unwrap().set_uint8(3);
    n.fetch("c/inner").unwrap().set_uint8_slice(&[4, 5]);

    assert_eq!(n.serialize(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn zero_count_leaves_and_empty_lists_serialize_to_nothing() {
    let mut n = Node::new();
    n.set_int32_slice(&[]);
    assert_eq!(n.dtype().count(), 0);
    assert_eq!(n.total_bytes(), 0);
    assert!(n.serialize().is_empty());

    let mut list = Node::new();
    list.set_dtype(DataType::list());
    assert!(list.serialize().is_empty());
}

#[test]
fn endian_swap_updates_bytes_and_descriptor() {
    let n = Node::generate(
        r#"{"v": {"dtype": "uint16", "length": 2, "endianness": "little",
                 "value": [258, 772]}}"#,
        crate::generator::Protocol::Detailed,
    )
    .unwrap();
    let mut n = n;
    n.fetch("v").unwrap().endian_swap_to_big().unwrap();

    let leaf = n.get("v");
    assert_eq!(leaf.dtype().endianness(), Endianness::Big);
    // 258 = 0x0102, 772 = 0x0304: big-endian memory reads 01 02 03 04.
    assert_eq!(leaf.serialize(), vec![0x01, 0x02, 0x03, 0x04]);
    // Values are unchanged through the view.
    assert_eq!(leaf.as_uint16().unwrap().to_vec(), vec![0x0102, 0x0304]);
}

#[test]
fn endian_swap_twice_is_identity() {
    let mut n = Node::new();
    n.set_uint32_slice(&[0xDEADBEEF, 0x01020304]);
    let before = n.serialize();
    n.endian_swap_to_big().unwrap();
    n.endian_swap_to_big().unwrap();
    assert_eq!(n.serialize(), before);

    n.endian_swap_to_big().unwrap();
    n.endian_swap_to_machine_default().unwrap();
    assert_eq!(n.serialize(), before);
    assert_eq!(n.as_uint32().unwrap().to_vec(), vec![0xDEADBEEF, 0x01020304]);
}

#[test]
fn coercion_widens_and_truncates() {
    let mut n = Node::new();
    n.set_int16(-2);
    assert_eq!(n.to_int64().unwrap(), -2);
    assert_eq!(n.to_float64().unwrap(), -2.0);
    assert_eq!(n.to_uint16().unwrap(), u16::MAX - 1);

    n.set_float64(300.7);
    assert_eq!(n.to_int32().unwrap(), 300);
    assert_eq!(n.to_uint8().unwrap(), 255); // saturates
    assert_eq!(n.to_int8().unwrap(), 127); // saturates

    n.set_float32(f32::NAN);
    assert_eq!(n.to_int32().unwrap(), 0);
}

#[test]
fn coercion_requires_a_single_numeric_element() {
    let mut n = Node::new();
    n.set_int32_slice(&[1, 2]);
    assert_eq!(kind_of(n.to_int32().unwrap_err()), ErrorKind::TypeMismatch);

    let mut obj = Node::new();
    obj.fetch("a").unwrap();
    assert_eq!(kind_of(obj.to_int32().unwrap_err()), ErrorKind::TypeMismatch);

    let mut s = Node::new();
    s.set_string("12");
    assert_eq!(kind_of(s.to_int32().unwrap_err()), ErrorKind::TypeMismatch);
}

#[test]
fn array_coercion_converts_elementwise() {
    let mut n = Node::new();
    n.set_float64_slice(&[1.9, -2.9, 300.0]);
    let mut dest = Node::new();
    n.to_int8_array(&mut dest).unwrap();
    assert_eq!(dest.tag(), TypeTag::Int8);
    assert_eq!(dest.as_int8().unwrap().to_vec(), vec![1, -2, 127]);
}

#[test]
fn strings_round_trip_through_char8_str() {
    let mut n = Node::new();
    n.set_string("héllo");
    assert_eq!(n.tag(), TypeTag::Char8Str);
    assert_eq!(n.dtype().count(), "héllo".len());
    assert_eq!(n.as_str().unwrap(), "héllo");
}

#[test]
fn raw_pointer_access_requires_dense_layout() {
    let mut backing: Vec<u32> = (0..4).collect();
    let strided = DataType::new(TypeTag::UInt32, 2, 0, 8, 4, Endianness::Default).unwrap();
    let mut n = Node::new();
    // SAFETY: backing outlives n within this test.
    unsafe {
        n.set_external(backing.as_mut_ptr() as *mut u8, 16, strided).unwrap();
    }
    assert_eq!(kind_of(n.as_uint32_ptr().unwrap_err()), ErrorKind::Layout);

    n.compact();
    let ptr = n.as_uint32_ptr().unwrap();
    // SAFETY: the node owns a compact buffer of two u32 elements.
    unsafe {
        assert_eq!(*ptr, 0);
        assert_eq!(*ptr.add(1), 2);
    }
}

#[test]
fn equality_ignores_layout_but_not_values() {
    let mut dense = Node::new();
    dense.fetch("v").unwrap().set_uint16_slice(&[7, 9]);

    let mut backing = [0u8; 8];
    backing[0..2].copy_from_slice(&7u16.to_ne_bytes());
    backing[4..6].copy_from_slice(&9u16.to_ne_bytes());
    let strided = DataType::new(TypeTag::UInt16, 2, 0, 4, 2, Endianness::Default).unwrap();
    let mut sparse = Node::new();
    sparse
        .fetch("v")
        .map(|leaf| {
            // SAFETY: backing outlives sparse within this test.
            unsafe { leaf.set_external(backing.as_mut_ptr(), 8, strided) }
        })
        .unwrap()
        .unwrap();

    assert_eq!(dense, sparse);

    dense.fetch("v").unwrap().as_uint16_mut().unwrap().set(0, 8);
    assert_ne!(dense, sparse);
}

#[test]
fn equality_compares_across_byte_orders() {
    let little = Node::generate(
        r#"{"x": {"dtype": "uint32", "endianness": "little", "value": 515}}"#,
        crate::generator::Protocol::Detailed,
    )
    .unwrap();
    let big = Node::generate(
        r#"{"x": {"dtype": "uint32", "endianness": "big", "value": 515}}"#,
        crate::generator::Protocol::Detailed,
    )
    .unwrap();
    assert_eq!(little, big);
}

#[test]
fn clone_is_a_deep_copy() {
    let mut n = Node::new();
    n.fetch("a").unwrap().set_int32_slice(&[1, 2, 3]);
    let copy = n.clone();

    n.fetch("a").unwrap().as_int32_mut().unwrap().set(0, 99);
    assert_eq!(copy.get("a").as_int32().unwrap().get(0), 1);
    assert_eq!(n.get("a").as_int32().unwrap().get(0), 99);
}

#[test]
fn paths_without_expansion_lists_direct_children() {
    let mut n = Node::new();
    n.fetch("a/b").unwrap().set_int8(1);
    n.fetch("c").unwrap().set_int8(2);
    assert_eq!(n.paths(false), vec!["a".to_string(), "c".to_string()]);
    assert_eq!(n.paths(true), vec!["a/b".to_string(), "c".to_string()]);
}

#[test]
fn accessor_tag_mismatch_is_reported() {
    let mut n = Node::new();
    n.set_int32(1);
    assert_eq!(kind_of(n.as_float64().unwrap_err()), ErrorKind::TypeMismatch);
}
