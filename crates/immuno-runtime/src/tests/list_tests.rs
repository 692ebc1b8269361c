use super::*;

#[test]
fn append_preserves_insertion_order_and_keys_stay_stable() {
    let mut list = OrderedList::new();
    let a = list.append("a").unwrap();
    let b = list.append("b").unwrap();
    let c = list.append("c").unwrap();

    assert_eq!(list.remove(b), Some("b"));
    let d = list.append("d").unwrap();

    assert!(d > c, "removed keys are never reissued");
    assert_eq!(list.get(a), Some(&"a"));
    assert_eq!(list.get(b), None);
    assert_eq!(
        list.iter().map(|(_, v)| *v).collect::<Vec<_>>(),
        vec!["a", "c", "d"]
    );
}

#[test]
fn clear_retires_issued_keys() {
    let mut list = OrderedList::new();
    let first = list.append(1).unwrap();
    list.clear();
    assert!(list.is_empty());
    let second = list.append(2).unwrap();
    assert_ne!(first, second);
    assert!(!list.contains(first));
}

#[test]
fn truncate_drops_the_tail() {
    let mut list = OrderedList::new();
    for i in 0..5 {
        list.append(i).unwrap();
    }
    list.truncate(2);
    assert_eq!(list.len(), 2);
    assert_eq!(list.keys().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn cursor_walks_forward_and_rewinds() {
    let mut list = OrderedList::new();
    let keys: Vec<_> = ["x", "y", "z"]
        .into_iter()
        .map(|v| list.append(v).unwrap())
        .collect();

    let mut cursor = Cursor::default();
    let mut seen = Vec::new();
    while let Some(key) = cursor.read(&list) {
        seen.push(key);
    }
    assert_eq!(seen, keys);
    assert_eq!(cursor.read(&list), None, "stays exhausted");

    cursor.rewind();
    assert_eq!(cursor.position(), 0);
    assert_eq!(cursor.read(&list), Some(keys[0]));
}

#[test]
fn cursor_on_empty_list_reads_nothing() {
    let list: OrderedList<u8> = OrderedList::new();
    let mut cursor = Cursor::default();
    assert_eq!(cursor.read(&list), None);
}

#[test]
fn get_mut_and_drain_follow_insertion_order() {
    let mut list = OrderedList::new();
    let key = list.append(10).unwrap();
    list.append(20).unwrap();
    *list.get_mut(key).unwrap() += 1;

    let drained: Vec<_> = list.drain().map(|(_, v)| v).collect();
    assert_eq!(drained, vec![11, 20]);
    assert!(list.is_empty());
}
