use specforge::io::spec_source::{changed_specs, load_spec};
use specforge::test_support::{TestRepo, spec_yaml};

#[test]
fn changed_specs_lists_added_and_modified_yaml_only() {
    let repo = TestRepo::new().expect("repo");
    repo.write_spec("heap_sort.yml", &spec_yaml("Heap Sort", "sorting"))
        .expect("spec");
    repo.write_spec("old.yml", &spec_yaml("Old Sort", "sorting"))
        .expect("spec");
    let base = repo.commit_all("specs: initial").expect("commit");

    repo.write_spec("heap_sort.yml", &spec_yaml("Heap Sort", "heaps"))
        .expect("modify");
    repo.write_spec("binary_search.yaml", &spec_yaml("Binary Search", "searching"))
        .expect("add");
    repo.write_spec("README.md", "not a spec\n").expect("readme");
    repo.write("algolib/notes.yml", "elsewhere: true\n").expect("outside");
    std::fs::remove_file(repo.path().join("specs/old.yml")).expect("delete");
    repo.commit_all("specs: update").expect("commit");

    let changed = changed_specs(&repo.git(), repo.path(), "specs", &base).expect("changed");
    assert_eq!(
        changed,
        vec![
            repo.path().join("specs/binary_search.yaml"),
            repo.path().join("specs/heap_sort.yml"),
        ]
    );
    for path in &changed {
        load_spec(path).expect("changed spec loads");
    }
}

#[test]
fn nothing_changed_is_empty() {
    let repo = TestRepo::new().expect("repo");
    repo.write_spec("heap_sort.yml", &spec_yaml("Heap Sort", "sorting"))
        .expect("spec");
    let head = repo.commit_all("specs: initial").expect("commit");
    let changed = changed_specs(&repo.git(), repo.path(), "specs", &head).expect("changed");
    assert!(changed.is_empty());
}

#[test]
fn unknown_base_is_an_error() {
    let repo = TestRepo::new().expect("repo");
    let err = changed_specs(&repo.git(), repo.path(), "specs", "no-such-ref").unwrap_err();
    assert!(format!("{err:#}").contains("no-such-ref"));
}
