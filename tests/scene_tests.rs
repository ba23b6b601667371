//! SceneController against the in-process fake server

mod common;

#[cfg(test)]
mod tests {
    use super::common::FakeServer;
    use serde_json::json;
    use std::f64::consts::PI;
    use vttl_client::{BoardSpec, ClientError, LineAxis, SceneController, Vec3};

    async fn scene(server: &FakeServer, dir: &tempfile::TempDir) -> SceneController {
        SceneController::connect(server.config(dir.path()))
            .await
            .unwrap()
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9 && (a.z - b.z).abs() < 1e-9
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn connect_syncs_the_registry() {
        let server = FakeServer::start().await;
        server.seed("prop_a", "cube", [1.0, 0.5, 0.0]);
        server.seed("mini_b", "", [2.0, 0.5, 0.0]);
        let dir = tempfile::tempdir().unwrap();
        let scene = scene(&server, &dir).await;

        assert_eq!(scene.count_entities(), 2);
        assert_eq!(scene.get_entity("prop_a").unwrap().kind, "cube");
        assert_eq!(scene.get_entity("mini_b").unwrap().kind, "unknown");
        let names: Vec<&str> = scene
            .list_entities()
            .into_iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["mini_b", "prop_a"]);
    }

    #[tokio::test]
    async fn primitives_carry_type_and_color() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        let cube = scene
            .create_cube("prop_cube", Vec3::new(1.5, 0.5, -2.5), None)
            .await
            .unwrap();
        assert_eq!(cube.color(), Some([0.7, 0.7, 0.7]));
        scene
            .create_model(
                "prop_tree",
                "models/tree.glb",
                Vec3::zero(),
                None,
                Some(Vec3::new(2.0, 2.0, 2.0)),
            )
            .await
            .unwrap();

        server.wait_for("create_entity", 2).await;
        let sent = server.payloads("create_entity");
        assert_eq!(sent[0]["position"], json!([1.5, 0.5, -2.5]));
        assert_eq!(sent[0]["properties"], json!({ "type": "cube", "color": [0.7, 0.7, 0.7] }));
        assert_eq!(sent[1]["template"], json!("models/tree.glb"));
        assert_eq!(sent[1]["properties"]["model_path"], json!("models/tree.glb"));
        assert_eq!(sent[1]["properties"]["scale"], json!([2.0, 2.0, 2.0]));
        assert_eq!(scene.get_entity("prop_tree").unwrap().kind, "model");
    }

    #[tokio::test]
    async fn unknown_entities_are_rejected_before_sending() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        let err = scene
            .move_entity("ghost", Vec3::zero(), true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownEntity(ref n) if n == "ghost"));
        assert!(scene.delete_entity("ghost").await.is_err());
        assert!(scene.update_entity_color("ghost", [1.0, 0.0, 0.0]).await.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.count("move_entity"), 0);
        assert_eq!(server.count("execute_javascript"), 0);
    }

    // -----------------------------------------------------------------------
    // Arrangements
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn arrange_in_circle_places_each_entity_on_the_ring() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        let names = ["prop_0", "prop_1", "prop_2", "prop_3"];
        for name in names {
            scene.create_cube(name, Vec3::zero(), None).await.unwrap();
        }

        let center = Vec3::new(0.0, 0.5, 0.0);
        assert!(scene.arrange_in_circle(&names, 4.0, Some(center), true).await);

        for (i, name) in names.iter().enumerate() {
            let angle = 2.0 * PI * i as f64 / 4.0;
            let want = Vec3::new(4.0 * angle.cos(), 0.5, 4.0 * angle.sin());
            let got = scene.get_entity(name).unwrap().position;
            assert!(close(got, want), "{name}: {got} != {want}");
        }

        server.wait_for("move_entity", 4).await;
        let moves = server.payloads("move_entity");
        assert_eq!(moves[0]["name"], json!("prop_0"));
        assert_eq!(moves[0]["to"], json!([4.0, 0.5, 0.0]));
        assert_eq!(moves[0]["animate"], json!(true));
    }

    #[tokio::test]
    async fn arrange_in_line_and_grid() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        let names = ["prop_a", "prop_b", "prop_c", "prop_d"];
        for name in names {
            scene.create_cube(name, Vec3::zero(), None).await.unwrap();
        }

        assert!(scene.arrange_in_line(&names, 2.0, None, LineAxis::X, false).await);
        assert_eq!(scene.get_entity("prop_a").unwrap().position, Vec3::new(-4.0, 0.5, 0.0));
        assert_eq!(scene.get_entity("prop_d").unwrap().position, Vec3::new(2.0, 0.5, 0.0));

        assert!(!scene.arrange_in_grid(&names, 1, 3, 1.0, None, false).await);
        assert_eq!(scene.get_entity("prop_a").unwrap().position, Vec3::new(-4.0, 0.5, 0.0));

        assert!(scene.arrange_in_grid(&names, 2, 2, 2.0, None, false).await);
        assert_eq!(scene.get_entity("prop_d").unwrap().position, Vec3::new(1.0, 0.5, 1.0));
    }

    #[tokio::test]
    async fn arrangement_reports_unknown_members() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;
        scene.create_cube("prop_a", Vec3::zero(), None).await.unwrap();

        let ok = scene
            .arrange_in_line(&["prop_a", "ghost"], 1.0, None, LineAxis::Z, false)
            .await;
        assert!(!ok);
        server.wait_for("move_entity", 1).await;
        assert_eq!(server.count("move_entity"), 1);

        let none: [&str; 0] = [];
        assert!(!scene.arrange_in_circle(&none, 2.0, None, false).await);
    }

    // -----------------------------------------------------------------------
    // Walls & collisions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn solid_wall_blocks_touch_without_colliding() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        let blocks = scene
            .create_solid_wall("wall", 2, 3, Vec3::new(0.0, 0.5, 0.0), Some([0.4, 0.4, 0.4]))
            .await;
        assert_eq!(blocks.len(), 6);
        assert_eq!(blocks[0], "wall_0_0");
        assert_eq!(blocks[5], "wall_1_2");
        assert_eq!(scene.get_entity("wall_1_2").unwrap().position, Vec3::new(2.0, 1.5, 0.0));

        for name in &blocks {
            let at = scene.get_entity(name).unwrap().position;
            assert!(scene.check_collisions(name, at).is_clear(), "{name} collides");
        }

        let inside = scene.check_collisions("mini_x", Vec3::new(1.0, 0.5, 0.3));
        assert_eq!(inside.names(), vec!["wall_0_1"]);
    }

    #[tokio::test]
    async fn safe_position_on_an_empty_scene_is_the_preferred_one() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let scene = scene(&server, &dir).await;

        let preferred = Vec3::new(3.0, 0.5, -1.0);
        assert_eq!(scene.find_safe_position("mini_x", preferred, 2.0), Some(preferred));
    }

    #[tokio::test]
    async fn safe_position_steps_around_an_obstacle() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;
        scene
            .create_cube("prop_rock", Vec3::new(0.0, 0.5, 0.0), None)
            .await
            .unwrap();

        let preferred = Vec3::new(0.0, 0.5, 0.0);
        let found = scene.find_safe_position("mini_x", preferred, 2.0).unwrap();
        // The half-unit ring still overlaps; the first touching spot is one
        // unit out along +x.
        assert!(close(found, Vec3::new(1.0, 0.5, 0.0)), "{found}");

        assert_eq!(scene.find_safe_position("mini_x", preferred, 0.5), None);
    }

    #[tokio::test]
    async fn tiles_are_table_surface_not_obstacles() {
        let server = FakeServer::start().await;
        for x in 0..5 {
            for z in 0..5 {
                server.seed(&format!("tile_{x}_{z}"), "tile", [x as f64, 0.0, z as f64]);
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;
        assert_eq!(scene.count_entities(), 25);
        scene
            .client_mut()
            .setup_board(BoardSpec {
                width: 5,
                height: 5,
                create_tiles: false,
                ..Default::default()
            })
            .await
            .unwrap();

        let preferred = Vec3::new(2.0, 0.5, 2.0);
        assert_eq!(scene.find_safe_position("mini_x", preferred, 2.0), Some(preferred));
        assert!(scene.check_collisions("mini_x", Vec3::new(4.0, 0.5, 4.0)).is_clear());
        assert!(!scene.check_collisions("mini_x", Vec3::new(5.0, 0.5, 4.0)).on_table);
    }

    // -----------------------------------------------------------------------
    // Colour, screenshots, clearing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn colorize_uses_a_rainbow_by_default() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        let names = ["prop_r", "prop_g", "prop_b"];
        for name in names {
            scene.create_cube(name, Vec3::zero(), None).await.unwrap();
        }
        assert!(scene.colorize_entities(&names, None).await);

        let red = scene.get_entity("prop_r").unwrap().color().unwrap();
        assert!(red[0] > red[1] && red[0] > red[2]);
        let green = scene.get_entity("prop_g").unwrap().color().unwrap();
        assert!(green[1] > green[0] && green[1] > green[2]);

        server.wait_for("execute_javascript", 3).await;
        let code = server.payloads("execute_javascript")[0]["code"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(code.contains(r#"findByName("prop_r")"#));
    }

    #[tokio::test]
    async fn screenshot_reports_success() {
        let server = FakeServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let scene = scene(&server, &dir).await;

        assert!(scene.take_screenshot().await);
        assert!(dir.path().join("latest_screenshot.png").exists());
    }

    #[tokio::test]
    async fn clear_scene_keeps_named_entities() {
        let server = FakeServer::start().await;
        server.seed("cam_main", "camera", [0.0, 10.0, 0.0]);
        server.seed("prop_a", "cube", [0.0, 0.5, 0.0]);
        server.seed("mini_b", "orc", [1.0, 0.5, 0.0]);
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;

        assert_eq!(scene.clear_scene(&["cam_main"]).await, 2);
        assert_eq!(scene.count_entities(), 1);
        assert!(scene.get_entity("cam_main").is_some());

        server.wait_for("delete_entity", 2).await;
        assert_eq!(server.entity_names(), vec!["cam_main"]);
    }

    #[tokio::test]
    async fn clear_scene_counts_only_server_deletes() {
        let server = FakeServer::start().await;
        server.seed("cam_main", "camera", [0.0, 10.0, 0.0]);
        server.seed("prop_a", "cube", [0.0, 0.5, 0.0]);
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene(&server, &dir).await;
        scene
            .create_cube("prop_ghost", Vec3::new(2.0, 0.5, 0.0), None)
            .await
            .unwrap();
        server.wait_for("create_entity", 1).await;
        server.forget("prop_ghost");

        assert_eq!(scene.clear_scene(&["cam_main"]).await, 1);
        assert_eq!(scene.count_entities(), 1);
        assert!(scene.get_entity("prop_ghost").is_none());

        server.wait_for("delete_entity", 1).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(server.count("delete_entity"), 1);
    }
}
