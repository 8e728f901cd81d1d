mod mock_recovery;
